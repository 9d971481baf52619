// ABOUTME: OpenAI Chat Completions exchange: role mapping, function tools, content parts.
// ABOUTME: Translates internal messages to the wire shape and parses tool_calls replies.

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use muster_core::{Message, Model, Role, ToolCall, ToolSpec};

use crate::api::AdapterError;
use crate::providers::{await_cancellable, ensure_success};
use crate::turns::{ProviderExchange, ProviderTurn};

/// Chat Completions adapter half: one wire call per turn.
pub struct OpenAiChatExchange {
    client: reqwest::Client,
}

impl Default for OpenAiChatExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAiChatExchange {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Build the JSON request body for the Chat Completions API.
    pub fn build_request_body(model: &Model, messages: &[Message], tools: &[ToolSpec]) -> Value {
        let mut wire_messages = Vec::with_capacity(messages.len());
        for msg in messages {
            wire_messages.push(match msg.role {
                Role::System => json!({"role": "system", "content": msg.content}),
                Role::Assistant => {
                    let mut m = json!({"role": "assistant", "content": msg.content});
                    if !msg.tool_calls.is_empty() {
                        m["tool_calls"] = Value::Array(
                            msg.tool_calls.iter().map(wire_tool_call).collect(),
                        );
                    }
                    m
                }
                Role::User => {
                    if msg.is_text() {
                        json!({"role": "user", "content": msg.content})
                    } else {
                        json!({"role": "user", "content": [content_part(msg)]})
                    }
                }
                Role::Tool => json!({
                    "role": "tool",
                    "tool_call_id": msg.tool_call_id.clone().unwrap_or_default(),
                    "content": msg.content,
                }),
            });
        }

        let mut body = json!({
            "model": model.model_id,
            "messages": wire_messages,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(wire_tool).collect());
            body["tool_choice"] = json!("auto");
        }
        body
    }

    /// Parse a Chat Completions response into a provider turn.
    pub fn parse_response(body: &Value) -> Result<ProviderTurn, AdapterError> {
        let message = body
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|c| c.get("message"))
            .ok_or_else(|| {
                AdapterError::InvalidResponse("missing choices[0].message".to_string())
            })?;

        let content = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or("")
            .to_string();

        let mut tool_calls = Vec::new();
        if let Some(calls) = message.get("tool_calls").and_then(|t| t.as_array()) {
            for call in calls {
                tool_calls.push(parse_tool_call(call)?);
            }
        }

        Ok(ProviderTurn {
            content,
            mime_type: muster_core::TEXT_PLAIN.to_string(),
            tool_calls,
        })
    }
}

fn wire_tool(spec: &ToolSpec) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": spec.name,
            "description": spec.description,
            "parameters": spec.parameters,
        }
    })
}

fn wire_tool_call(call: &ToolCall) -> Value {
    json!({
        "id": call.id,
        "type": "function",
        "function": {
            "name": call.name,
            "arguments": Value::Object(call.arguments.clone()).to_string(),
        }
    })
}

/// Encode a non-text user message as a typed content part. The content is
/// expected to be a data URL.
fn content_part(msg: &Message) -> Value {
    let mime = msg.content_type.as_str();
    if mime.starts_with("image/") {
        json!({"type": "image_url", "image_url": {"url": msg.content}})
    } else if mime.starts_with("audio/") {
        let format = mime.split('/').nth(1).unwrap_or("wav");
        json!({"type": "input_audio", "input_audio": {"data": msg.content, "format": format}})
    } else {
        json!({"type": "text", "text": msg.content})
    }
}

fn parse_tool_call(call: &Value) -> Result<ToolCall, AdapterError> {
    let id = call
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AdapterError::InvalidResponse("tool call missing id".to_string()))?;
    let function = call
        .get("function")
        .ok_or_else(|| AdapterError::InvalidResponse("tool call missing function".to_string()))?;
    let name = function
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AdapterError::InvalidResponse("function missing name".to_string()))?;
    let arguments_str = function
        .get("arguments")
        .and_then(|v| v.as_str())
        .unwrap_or("{}");
    let arguments: Value = serde_json::from_str(arguments_str).map_err(|e| {
        AdapterError::InvalidResponse(format!("bad function arguments: {e}"))
    })?;

    Ok(ToolCall::new(
        id,
        name,
        arguments.as_object().cloned().unwrap_or_default(),
    ))
}

#[async_trait]
impl ProviderExchange for OpenAiChatExchange {
    async fn exchange(
        &self,
        cancel: &CancellationToken,
        model: &Model,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<ProviderTurn, AdapterError> {
        let body = Self::build_request_body(model, messages, tools);
        let url = format!("{}/chat/completions", model.base_url.trim_end_matches('/'));

        let response = await_cancellable(
            cancel,
            self.client
                .post(&url)
                .bearer_auth(&model.api_key)
                .json(&body)
                .send(),
        )
        .await?;
        let response = ensure_success(response, "openai").await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| AdapterError::InvalidResponse(format!("bad json: {e}")))?;
        Self::parse_response(&body)
    }
}
