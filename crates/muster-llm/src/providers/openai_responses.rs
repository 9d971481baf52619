// ABOUTME: OpenAI Responses API exchange: instructions, input items, function_call items.
// ABOUTME: Tool results travel back as function_call_output items keyed by call_id.

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use muster_core::{Message, Model, Role, ToolCall, ToolSpec};

use crate::api::AdapterError;
use crate::providers::{await_cancellable, ensure_success};
use crate::turns::{ProviderExchange, ProviderTurn};

/// Responses API adapter half: one wire call per turn.
pub struct OpenAiResponsesExchange {
    client: reqwest::Client,
}

impl Default for OpenAiResponsesExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAiResponsesExchange {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Build the JSON request body for the Responses API. System messages
    /// lift into `instructions`; tool traffic becomes function_call /
    /// function_call_output items.
    pub fn build_request_body(model: &Model, messages: &[Message], tools: &[ToolSpec]) -> Value {
        let instructions: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let mut input = Vec::new();
        for msg in messages {
            match msg.role {
                Role::System => {}
                Role::User => input.push(json!({
                    "role": "user",
                    "content": [user_content(msg)],
                })),
                Role::Assistant => {
                    if !msg.content.is_empty() {
                        input.push(json!({
                            "role": "assistant",
                            "content": [{"type": "output_text", "text": msg.content}],
                        }));
                    }
                    for call in &msg.tool_calls {
                        input.push(json!({
                            "type": "function_call",
                            "call_id": call.id,
                            "name": call.name,
                            "arguments": Value::Object(call.arguments.clone()).to_string(),
                        }));
                    }
                }
                Role::Tool => input.push(json!({
                    "type": "function_call_output",
                    "call_id": msg.tool_call_id.clone().unwrap_or_default(),
                    "output": msg.content,
                })),
            }
        }

        let mut body = json!({
            "model": model.model_id,
            "input": input,
        });
        if !instructions.is_empty() {
            body["instructions"] = json!(instructions.join("\n"));
        }
        if !tools.is_empty() {
            body["tools"] = Value::Array(
                tools
                    .iter()
                    .map(|t| {
                        json!({
                            "type": "function",
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        })
                    })
                    .collect(),
            );
        }
        body
    }

    /// Parse a Responses API reply: message output items carry text,
    /// function_call items carry tool calls.
    pub fn parse_response(body: &Value) -> Result<ProviderTurn, AdapterError> {
        let output = body
            .get("output")
            .and_then(|o| o.as_array())
            .ok_or_else(|| {
                AdapterError::InvalidResponse("missing output array".to_string())
            })?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for item in output {
            match item.get("type").and_then(|t| t.as_str()) {
                Some("message") => {
                    if let Some(parts) = item.get("content").and_then(|c| c.as_array()) {
                        for part in parts {
                            if part.get("type").and_then(|t| t.as_str()) == Some("output_text")
                                && let Some(t) = part.get("text").and_then(|t| t.as_str())
                            {
                                text.push_str(t);
                            }
                        }
                    }
                }
                Some("function_call") => {
                    let call_id = item
                        .get("call_id")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| {
                            AdapterError::InvalidResponse(
                                "function_call missing call_id".to_string(),
                            )
                        })?;
                    let name = item
                        .get("name")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| {
                            AdapterError::InvalidResponse(
                                "function_call missing name".to_string(),
                            )
                        })?;
                    let arguments_str =
                        item.get("arguments").and_then(|v| v.as_str()).unwrap_or("{}");
                    let arguments: Value =
                        serde_json::from_str(arguments_str).map_err(|e| {
                            AdapterError::InvalidResponse(format!("bad arguments: {e}"))
                        })?;
                    tool_calls.push(ToolCall::new(
                        call_id,
                        name,
                        arguments.as_object().cloned().unwrap_or_default(),
                    ));
                }
                _ => {}
            }
        }

        Ok(ProviderTurn {
            content: text,
            mime_type: muster_core::TEXT_PLAIN.to_string(),
            tool_calls,
        })
    }
}

fn user_content(msg: &Message) -> Value {
    if msg.content_type.starts_with("image/") {
        json!({"type": "input_image", "image_url": msg.content})
    } else {
        json!({"type": "input_text", "text": msg.content})
    }
}

#[async_trait]
impl ProviderExchange for OpenAiResponsesExchange {
    async fn exchange(
        &self,
        cancel: &CancellationToken,
        model: &Model,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<ProviderTurn, AdapterError> {
        let body = Self::build_request_body(model, messages, tools);
        let url = format!("{}/responses", model.base_url.trim_end_matches('/'));

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_model;

    #[test]
    fn build_body_lifts_system_and_maps_tool_traffic() {
        let messages = vec![
            Message::system("be terse"),
            Message::user("2+3?"),
            Message::assistant("").with_tool_calls(vec![ToolCall::new(
                "call_1",
                "add",
                json!({"a": 2}).as_object().unwrap().clone(),
            )]),
            Message::tool("5", "call_1"),
        ];
        let body =
            OpenAiResponsesExchange::build_request_body(&test_model(), &messages, &[]);

        assert_eq!(body["instructions"], "be terse");
        let input = body["input"].as_array().unwrap();
        assert_eq!(input[0]["role"], "user");
        assert_eq!(input[0]["content"][0]["type"], "input_text");
        assert_eq!(input[1]["type"], "function_call");
        assert_eq!(input[1]["call_id"], "call_1");
        assert_eq!(input[2]["type"], "function_call_output");
        assert_eq!(input[2]["output"], "5");
    }

    #[test]
    fn tools_are_flat_function_entries() {
        let tools = vec![ToolSpec::new("add", "Add", json!({"type": "object"}))];
        let body = OpenAiResponsesExchange::build_request_body(
            &test_model(),
            &[Message::user("hi")],
            &tools,
        );
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["name"], "add");
        assert!(body["tools"][0].get("function").is_none());
    }

    #[test]
    fn parse_output_text_and_function_calls() {
        let body = json!({
            "output": [
                {
                    "type": "message",
                    "content": [{"type": "output_text", "text": "4"}]
                },
                {
                    "type": "function_call",
                    "call_id": "call_9",
                    "name": "add",
                    "arguments": "{\"a\": 1}"
                }
            ]
        });
        let turn = OpenAiResponsesExchange::parse_response(&body).unwrap();
        assert_eq!(turn.content, "4");
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].id, "call_9");
        assert_eq!(turn.tool_calls[0].arguments["a"], 1);
    }

    #[test]
    fn parse_rejects_missing_output() {
        assert!(OpenAiResponsesExchange::parse_response(&json!({})).is_err());
    }
}
