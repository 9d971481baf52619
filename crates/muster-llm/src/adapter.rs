// ABOUTME: The adapter registry and the concrete adapters it wires by default.
// ABOUTME: Chat dispatches by provider; image-gen is OpenAI-only; echo serialises the request back.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use muster_core::{Level, Outcome, WireApi};

use crate::api::{Adapter, AdapterError, ChatRequest, ChatResponse};
use crate::providers::{
    AnthropicExchange, GeminiExchange, OpenAiChatExchange, OpenAiImage, OpenAiResponsesExchange,
};
use crate::turns::run_turns;

/// Explicit adapter registry, wired at construction. Keys follow the model
/// type an agent resolves to: `chat`, `image-gen`, `tts`, `audio` (plus
/// `echo` for debugging). Unregistered keys resolve to a descriptive error.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn Adapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard wiring: chat, image-gen, and echo. Voice adapters
    /// (`tts`, `audio`) are external collaborators and stay unregistered.
    pub fn defaults() -> Self {
        let mut registry = Self::new();
        registry.register("chat", Arc::new(ChatDispatchAdapter::new()));
        registry.register("image-gen", Arc::new(ImageGenAdapter::new()));
        registry.register("echo", Arc::new(EchoAdapter));
        registry
    }

    pub fn register(&mut self, key: impl Into<String>, adapter: Arc<dyn Adapter>) {
        self.adapters.insert(key.into(), adapter);
    }

    pub fn get(&self, key: &str) -> Result<Arc<dyn Adapter>, AdapterError> {
        self.adapters
            .get(key)
            .cloned()
            .ok_or_else(|| AdapterError::Unsupported(format!("LLM adapter {key} not found")))
    }

    /// The registry key matching a model level.
    pub fn key_for_level(level: Level) -> &'static str {
        match level {
            Level::Image => "image-gen",
            Level::Tts => "tts",
            Level::L1 | Level::L2 | Level::L3 | Level::Any => "chat",
        }
    }
}

/// The `chat` adapter: picks the provider exchange from the model and runs
/// the shared inner turn loop against it.
pub struct ChatDispatchAdapter {
    openai_chat: OpenAiChatExchange,
    openai_responses: OpenAiResponsesExchange,
    anthropic: AnthropicExchange,
    gemini: GeminiExchange,
}

impl Default for ChatDispatchAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatDispatchAdapter {
    pub fn new() -> Self {
        Self {
            openai_chat: OpenAiChatExchange::new(),
            openai_responses: OpenAiResponsesExchange::new(),
            anthropic: AnthropicExchange::new(),
            gemini: GeminiExchange::new(),
        }
    }
}

#[async_trait]
impl Adapter for ChatDispatchAdapter {
    async fn call(
        &self,
        cancel: &CancellationToken,
        request: &ChatRequest,
    ) -> Result<ChatResponse, AdapterError> {
        match request.model.provider.as_str() {
            "openai" => match request.model.api {
                WireApi::Chat => run_turns(&self.openai_chat, cancel, request).await,
                WireApi::Responses => run_turns(&self.openai_responses, cancel, request).await,
            },
            "anthropic" => run_turns(&self.anthropic, cancel, request).await,
            "gemini" => run_turns(&self.gemini, cancel, request).await,
            "" => Err(AdapterError::Unsupported(
                "model provider must be set".to_string(),
            )),
            other => Err(AdapterError::Unsupported(format!(
                "unknown provider: {other}"
            ))),
        }
    }
}

/// The `image-gen` adapter. OpenAI is the only wired generator.
pub struct ImageGenAdapter {
    openai: OpenAiImage,
}

impl Default for ImageGenAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageGenAdapter {
    pub fn new() -> Self {
        Self {
            openai: OpenAiImage::new(),
        }
    }
}

#[async_trait]
impl Adapter for ImageGenAdapter {
    async fn call(
        &self,
        cancel: &CancellationToken,
        request: &ChatRequest,
    ) -> Result<ChatResponse, AdapterError> {
        match request.model.provider.as_str() {
            "openai" => self.openai.generate(cancel, request).await,
            other => Err(AdapterError::Unsupported(format!(
                "image generation not supported for provider: {other}"
            ))),
        }
    }
}

/// Serialises the request back as JSON. Useful for wiring checks without
/// spending tokens.
pub struct EchoAdapter;

#[async_trait]
impl Adapter for EchoAdapter {
    async fn call(
        &self,
        _cancel: &CancellationToken,
        request: &ChatRequest,
    ) -> Result<ChatResponse, AdapterError> {
        let summary = json!({
            "agent": request.agent,
            "model": request.model.model_id,
            "provider": request.model.provider,
            "messages": request.messages,
            "tools": request.tools.iter().map(|t| t.name.clone()).collect::<Vec<_>>(),
            "max_turns": request.max_turns,
        });
        Ok(ChatResponse::new(
            Outcome::exit_with_mime(summary.to_string(), "application/json"),
            Vec::new(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_model;
    use muster_core::{Message, RegistryRunner, ToolRegistry};

    fn request_with_provider(provider: &str) -> ChatRequest {
        let mut model = test_model();
        model.provider = provider.to_string();
        let runner = Arc::new(RegistryRunner::new(ToolRegistry::new(), 8));
        ChatRequest::new(
            "ask",
            model,
            vec![Message::user("hello")],
            Vec::new(),
            4,
            runner,
        )
    }

    #[test]
    fn registry_resolves_defaults_and_rejects_unknown_keys() {
        let registry = AdapterRegistry::defaults();
        assert!(registry.get("chat").is_ok());
        assert!(registry.get("image-gen").is_ok());
        assert!(registry.get("echo").is_ok());

        let err = registry.get("tts").unwrap_err();
        assert!(err.to_string().contains("tts"));
        assert!(registry.get("audio").is_err());
    }

    #[test]
    fn level_to_adapter_key_mapping() {
        assert_eq!(AdapterRegistry::key_for_level(Level::L1), "chat");
        assert_eq!(AdapterRegistry::key_for_level(Level::L2), "chat");
        assert_eq!(AdapterRegistry::key_for_level(Level::L3), "chat");
        assert_eq!(AdapterRegistry::key_for_level(Level::Any), "chat");
        assert_eq!(AdapterRegistry::key_for_level(Level::Image), "image-gen");
        assert_eq!(AdapterRegistry::key_for_level(Level::Tts), "tts");
    }

    #[tokio::test]
    async fn chat_dispatch_rejects_empty_and_unknown_providers() {
        let adapter = ChatDispatchAdapter::new();
        let cancel = CancellationToken::new();

        let err = adapter
            .call(&cancel, &request_with_provider(""))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("provider must be set"));

        let err = adapter
            .call(&cancel, &request_with_provider("mystery"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown provider"));
    }

    #[tokio::test]
    async fn image_gen_rejects_non_openai_providers() {
        let adapter = ImageGenAdapter::new();
        let cancel = CancellationToken::new();
        let err = adapter
            .call(&cancel, &request_with_provider("anthropic"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("image generation"));
    }

    #[tokio::test]
    async fn echo_adapter_serialises_the_request() {
        let adapter = EchoAdapter;
        let cancel = CancellationToken::new();
        let resp = adapter
            .call(&cancel, &request_with_provider("openai"))
            .await
            .unwrap();

        assert!(resp.outcome.is_exit());
        assert_eq!(resp.outcome.mime_type, "application/json");
        let parsed: serde_json::Value = serde_json::from_str(&resp.outcome.value).unwrap();
        assert_eq!(parsed["agent"], "ask");
        assert_eq!(parsed["max_turns"], 4);
    }
}
