// ABOUTME: Anthropic Messages API exchange: system prompt, tool_use blocks, tool_result content.
// ABOUTME: Images travel as base64 source blocks decoded from internal data URLs.

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use muster_core::{Message, Model, Role, ToolCall, ToolSpec};

use crate::api::AdapterError;
use crate::providers::{await_cancellable, ensure_success, split_data_url};
use crate::turns::{ProviderExchange, ProviderTurn};

const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// Messages API adapter half: one wire call per turn.
pub struct AnthropicExchange {
    client: reqwest::Client,
}

impl Default for AnthropicExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl AnthropicExchange {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Build the JSON request body for the Messages API. System messages
    /// lift into the top-level `system` field.
    pub fn build_request_body(model: &Model, messages: &[Message], tools: &[ToolSpec]) -> Value {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let mut wire_messages = Vec::new();
        for msg in messages {
            match msg.role {
                Role::System => {}
                Role::User => wire_messages.push(json!({
                    "role": "user",
                    "content": [user_block(msg)],
                })),
                Role::Assistant => {
                    let mut blocks = Vec::new();
                    if !msg.content.is_empty() {
                        blocks.push(json!({"type": "text", "text": msg.content}));
                    }
                    for call in &msg.tool_calls {
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.name,
                            "input": Value::Object(call.arguments.clone()),
                        }));
                    }
                    if blocks.is_empty() {
                        blocks.push(json!({"type": "text", "text": ""}));
                    }
                    wire_messages.push(json!({"role": "assistant", "content": blocks}));
                }
                Role::Tool => wire_messages.push(json!({
                    "role": "user",
                    "content": [{
                        "type": "tool_result",
                        "tool_use_id": msg.tool_call_id.clone().unwrap_or_default(),
                        "content": msg.content,
                    }],
                })),
            }
        }

        let mut body = json!({
            "model": model.model_id,
            "max_tokens": MAX_TOKENS,
            "messages": wire_messages,
        });
        if !system.is_empty() {
            body["system"] = json!(system.join("\n"));
        }
        if !tools.is_empty() {
            body["tools"] = Value::Array(
                tools
                    .iter()
                    .map(|t| {
                        json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.parameters,
                        })
                    })
                    .collect(),
            );
        }
        body
    }

    /// Parse a Messages API response into a provider turn.
    pub fn parse_response(body: &Value) -> Result<ProviderTurn, AdapterError> {
        let content = body
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| {
                AdapterError::InvalidResponse("missing content array".to_string())
            })?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in content {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    if let Some(t) = block.get("text").and_then(|t| t.as_str()) {
                        text.push_str(t);
                    }
                }
                Some("tool_use") => {
                    let id = block
                        .get("id")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| {
                            AdapterError::InvalidResponse("tool_use missing id".to_string())
                        })?;
                    let name = block
                        .get("name")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| {
                            AdapterError::InvalidResponse("tool_use missing name".to_string())
                        })?;
                    let input = block
                        .get("input")
                        .and_then(|v| v.as_object())
                        .cloned()
                        .unwrap_or_default();
                    tool_calls.push(ToolCall::new(id, name, input));
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

/// A user message as a content block: base64 image source for image data
/// URLs, plain text otherwise.
fn user_block(msg: &Message) -> Value {
    if msg.content_type.starts_with("image/")
        && let Some((mime, data)) = split_data_url(&msg.content)
    {
        return json!({
            "type": "image",
            "source": {"type": "base64", "media_type": mime, "data": data},
        });
    }
    json!({"type": "text", "text": msg.content})
}

#[async_trait]
impl ProviderExchange for AnthropicExchange {
    async fn exchange(
        &self,
        cancel: &CancellationToken,
        model: &Model,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<ProviderTurn, AdapterError> {
        let body = Self::build_request_body(model, messages, tools);
        let url = format!("{}/v1/messages", model.base_url.trim_end_matches('/'));

        let response = await_cancellable(
            cancel,
            self.client
                .post(&url)
                .header("x-api-key", &model.api_key)
                .header("anthropic-version", API_VERSION)
                .header("content-type", "application/json")
                .json(&body)
                .send(),
        )
        .await?;
        let response = ensure_success(response, "anthropic").await?;

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
    fn system_messages_lift_into_system_field() {
        let messages = vec![Message::system("be terse"), Message::user("hello")];
        let body = AnthropicExchange::build_request_body(&test_model(), &messages, &[]);

        assert_eq!(body["system"], "be terse");
        let wire = body["messages"].as_array().unwrap();
        assert_eq!(wire.len(), 1, "system messages stay out of messages");
        assert_eq!(wire[0]["role"], "user");
        assert_eq!(wire[0]["content"][0]["type"], "text");
        assert_eq!(body["max_tokens"], 4096);
    }

    #[test]
    fn assistant_tool_calls_become_tool_use_blocks() {
        let messages = vec![
            Message::user("2+3?"),
            Message::assistant("let me add").with_tool_calls(vec![ToolCall::new(
                "toolu_1",
                "add",
                json!({"a": 2}).as_object().unwrap().clone(),
            )]),
            Message::tool("5", "toolu_1"),
        ];
        let body = AnthropicExchange::build_request_body(&test_model(), &messages, &[]);
        let wire = body["messages"].as_array().unwrap();

        let assistant = &wire[1]["content"];
        assert_eq!(assistant[0]["type"], "text");
        assert_eq!(assistant[1]["type"], "tool_use");
        assert_eq!(assistant[1]["id"], "toolu_1");
        assert_eq!(assistant[1]["input"]["a"], 2);

        let result = &wire[2];
        assert_eq!(result["role"], "user");
        assert_eq!(result["content"][0]["type"], "tool_result");
        assert_eq!(result["content"][0]["tool_use_id"], "toolu_1");
        assert_eq!(result["content"][0]["content"], "5");
    }

    #[test]
    fn tools_use_input_schema_field() {
        let tools = vec![ToolSpec::new(
            "add",
            "Add",
            json!({"type": "object", "properties": {}}),
        )];
        let body =
            AnthropicExchange::build_request_body(&test_model(), &[Message::user("hi")], &tools);
        assert_eq!(body["tools"][0]["name"], "add");
        assert!(body["tools"][0]["input_schema"].is_object());
        assert!(body["tools"][0].get("parameters").is_none());
    }

    #[test]
    fn image_data_url_becomes_base64_source() {
        let messages =
            vec![Message::user("data:image/png;base64,AAAA").with_content_type("image/png")];
        let body = AnthropicExchange::build_request_body(&test_model(), &messages, &[]);
        let block = &body["messages"][0]["content"][0];
        assert_eq!(block["type"], "image");
        assert_eq!(block["source"]["media_type"], "image/png");
        assert_eq!(block["source"]["data"], "AAAA");
    }

    #[test]
    fn parse_text_and_tool_use() {
        let body = json!({
            "content": [
                {"type": "text", "text": "checking"},
                {"type": "tool_use", "id": "toolu_1", "name": "add", "input": {"a": 1}}
            ],
            "stop_reason": "tool_use"
        });
        let turn = AnthropicExchange::parse_response(&body).unwrap();
        assert_eq!(turn.content, "checking");
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].name, "add");
        assert_eq!(turn.tool_calls[0].arguments["a"], 1);
    }

    #[test]
    fn parse_rejects_missing_content() {
        assert!(AnthropicExchange::parse_response(&json!({})).is_err());
        let missing_name = json!({"content": [{"type": "tool_use", "id": "x", "input": {}}]});
        assert!(AnthropicExchange::parse_response(&missing_name).is_err());
    }
}
