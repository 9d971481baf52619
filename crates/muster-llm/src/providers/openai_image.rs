// ABOUTME: OpenAI image generation: prompt from the conversation, b64 JSON back as a data URL.
// ABOUTME: No tool loop here; one wire call produces an exit outcome with image/png content.

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use muster_core::{Arguments, JsonMap, Message, Model, Outcome, Role};

use crate::api::{AdapterError, ChatRequest, ChatResponse};
use crate::providers::{await_cancellable, data_url, ensure_success};

/// Images API client used by the image-gen adapter.
pub struct OpenAiImage {
    client: reqwest::Client,
}

impl Default for OpenAiImage {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAiImage {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Build the generation request. The prompt is the non-system
    /// conversation joined in order; size/quality/style come from the
    /// request arguments when present.
    pub fn build_request_body(model: &Model, messages: &[Message], args: &JsonMap) -> Value {
        let prompt: Vec<&str> = messages
            .iter()
            .filter(|m| m.role != Role::System && !m.content.is_empty())
            .map(|m| m.content.as_str())
            .collect();

        let mut body = json!({
            "model": model.model_id,
            "prompt": prompt.join("\n"),
            "n": 1,
            "response_format": "b64_json",
        });

        let args = Arguments::new(args);
        if let Some(size) = args.str("size") {
            body["size"] = json!(size);
        }
        if let Some(quality) = args.str("quality") {
            body["quality"] = json!(quality);
        }
        if let Some(style) = args.str("style") {
            body["style"] = json!(style);
        }
        body
    }

    /// Parse the generation response into an exit outcome carrying a
    /// data URL.
    pub fn parse_response(body: &Value) -> Result<Outcome, AdapterError> {
        let b64 = body
            .get("data")
            .and_then(|d| d.as_array())
            .and_then(|d| d.first())
            .and_then(|d| d.get("b64_json"))
            .and_then(|b| b.as_str())
            .ok_or_else(|| {
                AdapterError::InvalidResponse("missing data[0].b64_json".to_string())
            })?;
        Ok(Outcome::exit_with_mime(
            data_url("image/png", b64),
            "image/png",
        ))
    }

    pub async fn generate(
        &self,
        cancel: &CancellationToken,
        request: &ChatRequest,
    ) -> Result<ChatResponse, AdapterError> {
        let body =
            Self::build_request_body(&request.model, &request.messages, &request.arguments);
        let url = format!(
            "{}/images/generations",
            request.model.base_url.trim_end_matches('/')
        );

        let response = await_cancellable(
            cancel,
            self.client
                .post(&url)
                .bearer_auth(&request.model.api_key)
                .json(&body)
                .send(),
        )
        .await?;
        let response = ensure_success(response, "openai").await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| AdapterError::InvalidResponse(format!("bad json: {e}")))?;
        let outcome = Self::parse_response(&body)?;

        let message = Message::assistant(outcome.value.clone())
            .with_content_type(outcome.mime_type.clone())
            .with_sender(request.agent.clone());
        Ok(ChatResponse::new(outcome, vec![message]))
    }
}
