// ABOUTME: Gemini generateContent exchange: contents with functionCall/functionResponse parts.
// ABOUTME: Gemini has no tool-call ids, so the function name (suffixed on repeats) stands in.

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use muster_core::{Message, Model, Role, ToolCall, ToolSpec};

use crate::api::AdapterError;
use crate::providers::{await_cancellable, ensure_success, split_data_url};
use crate::turns::{ProviderExchange, ProviderTurn};

/// generateContent adapter half: one wire call per turn.
pub struct GeminiExchange {
    client: reqwest::Client,
}

impl Default for GeminiExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl GeminiExchange {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Build the JSON request body for generateContent. System messages
    /// lift into `systemInstruction`; assistant maps to the `model` role.
    pub fn build_request_body(messages: &[Message], tools: &[ToolSpec]) -> Value {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let mut contents = Vec::new();
        for msg in messages {
            match msg.role {
                Role::System => {}
                Role::User => contents.push(json!({
                    "role": "user",
                    "parts": [user_part(msg)],
                })),
                Role::Assistant => {
                    let mut parts = Vec::new();
                    if !msg.content.is_empty() {
                        parts.push(json!({"text": msg.content}));
                    }
                    for call in &msg.tool_calls {
                        parts.push(json!({
                            "functionCall": {
                                "name": call_function_name(&call.id),
                                "args": Value::Object(call.arguments.clone()),
                            }
                        }));
                    }
                    if parts.is_empty() {
                        parts.push(json!({"text": ""}));
                    }
                    contents.push(json!({"role": "model", "parts": parts}));
                }
                Role::Tool => contents.push(json!({
                    "role": "user",
                    "parts": [{
                        "functionResponse": {
                            "name": call_function_name(
                                msg.tool_call_id.as_deref().unwrap_or_default(),
                            ),
                            "response": {"content": msg.content},
                        }
                    }],
                })),
            }
        }

        let mut body = json!({"contents": contents});
        if !system.is_empty() {
            body["systemInstruction"] = json!({"parts": [{"text": system.join("\n")}]});
        }
        if !tools.is_empty() {
            body["tools"] = json!([{
                "functionDeclarations": tools
                    .iter()
                    .map(|t| json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }))
                    .collect::<Vec<Value>>(),
            }]);
        }
        body
    }

    /// Parse a generateContent response into a provider turn. Call ids are
    /// synthesised from the function name, suffixed when a name repeats
    /// within the turn so ids stay unique.
    pub fn parse_response(body: &Value) -> Result<ProviderTurn, AdapterError> {
        let parts = body
            .get("candidates")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.as_array())
            .ok_or_else(|| {
                AdapterError::InvalidResponse("missing candidates[0].content.parts".to_string())
            })?;

        let mut text = String::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();
        for part in parts {
            if let Some(t) = part.get("text").and_then(|t| t.as_str()) {
                text.push_str(t);
            }
            if let Some(call) = part.get("functionCall") {
                let name = call
                    .get("name")
                    .and_then(|n| n.as_str())
                    .ok_or_else(|| {
                        AdapterError::InvalidResponse("functionCall missing name".to_string())
                    })?;
                let args = call
                    .get("args")
                    .and_then(|a| a.as_object())
                    .cloned()
                    .unwrap_or_default();
                let repeats = tool_calls
                    .iter()
                    .filter(|c| call_function_name(&c.id) == name)
                    .count();
                let id = if repeats == 0 {
                    name.to_string()
                } else {
                    format!("{name}:{repeats}")
                };
                tool_calls.push(ToolCall::new(id, name, args));
            }
        }

        Ok(ProviderTurn {
            content: text,
            mime_type: muster_core::TEXT_PLAIN.to_string(),
            tool_calls,
        })
    }
}

/// Strip the uniqueness suffix off a synthesised call id.
fn call_function_name(id: &str) -> &str {
    id.split(':').next().unwrap_or(id)
}

fn user_part(msg: &Message) -> Value {
    if !msg.is_text()
        && let Some((mime, data)) = split_data_url(&msg.content)
    {
        return json!({"inlineData": {"mimeType": mime, "data": data}});
    }
    json!({"text": msg.content})
}

#[async_trait]
impl ProviderExchange for GeminiExchange {
    async fn exchange(
        &self,
        cancel: &CancellationToken,
        model: &Model,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<ProviderTurn, AdapterError> {
        let body = Self::build_request_body(messages, tools);
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            model.base_url.trim_end_matches('/'),
            model.model_id
        );

        let response = await_cancellable(
            cancel,
            self.client
                .post(&url)
                .header("x-goog-api-key", &model.api_key)
                .json(&body)
                .send(),
        )
        .await?;
        let response = ensure_success(response, "gemini").await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| AdapterError::InvalidResponse(format!("bad json: {e}")))?;
        Self::parse_response(&body)
    }
}
