// ABOUTME: Request/response types crossing the adapter boundary, and the Adapter trait.
// ABOUTME: AdapterError is the transport-facing error taxonomy; no retries happen at this layer.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use muster_core::{BatchRunner, JsonMap, Message, Model, Outcome, Role, ToolCall, ToolSpec};

/// A fully assembled request for one agent exchange: the conversation so
/// far, the advertised tools, the resolved model, and the tool-batch runner
/// the adapter drives on each inner turn.
#[derive(Clone)]
pub struct ChatRequest {
    pub agent: String,
    pub model: Model,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub max_turns: usize,
    /// Free-form per-request parameters (image size, quality, ...).
    pub arguments: JsonMap,
    pub runner: Arc<dyn BatchRunner>,
}

impl ChatRequest {
    pub fn new(
        agent: impl Into<String>,
        model: Model,
        messages: Vec<Message>,
        tools: Vec<ToolSpec>,
        max_turns: usize,
        runner: Arc<dyn BatchRunner>,
    ) -> Self {
        Self {
            agent: agent.into(),
            model,
            messages,
            tools,
            max_turns: max_turns.max(1),
            arguments: JsonMap::new(),
            runner,
        }
    }

    pub fn with_arguments(mut self, arguments: JsonMap) -> Self {
        self.arguments = arguments;
        self
    }
}

/// What an adapter hands back: the terminal outcome plus the messages that
/// were added to the conversation during the exchange.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub role: Role,
    pub outcome: Outcome,
    pub messages: Vec<Message>,
}

impl ChatResponse {
    pub fn new(outcome: Outcome, messages: Vec<Message>) -> Self {
        Self {
            role: Role::Assistant,
            outcome,
            messages,
        }
    }
}

/// Errors from the adapter layer. Transport failures surface unchanged to
/// the caller; the run fails without retry.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// The inner loop spent its whole turn budget with the model still
    /// requesting tools. Carries the last assistant text and the tool calls
    /// whose results were never fed back.
    #[error("turn budget exhausted after {turns} turns")]
    TurnBudget {
        turns: usize,
        last_content: String,
        pending_calls: Vec<ToolCall>,
    },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        AdapterError::Transport(err.to_string())
    }
}

/// A provider adapter: translate the request into the vendor wire shape,
/// run the provider-internal tool-use loop, and translate back.
#[async_trait]
pub trait Adapter: Send + Sync {
    async fn call(
        &self,
        cancel: &CancellationToken,
        request: &ChatRequest,
    ) -> Result<ChatResponse, AdapterError>;
}

impl std::fmt::Debug for dyn Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Adapter")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muster_core::{RegistryRunner, ToolRegistry};

    fn test_model() -> Model {
        Model {
            alias: "L2".to_string(),
            provider: "openai".to_string(),
            model_id: "gpt-4o".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: "key".to_string(),
            features: Default::default(),
            level: muster_core::Level::L2,
            api: Default::default(),
        }
    }

    #[test]
    fn request_clamps_max_turns_to_one() {
        let runner = Arc::new(RegistryRunner::new(ToolRegistry::new(), 8));
        let req = ChatRequest::new("ask", test_model(), Vec::new(), Vec::new(), 0, runner);
        assert_eq!(req.max_turns, 1);
    }

    #[test]
    fn turn_budget_error_carries_pending_metadata() {
        let err = AdapterError::TurnBudget {
            turns: 2,
            last_content: "working on it".to_string(),
            pending_calls: vec![ToolCall::new("c1", "add", JsonMap::new())],
        };
        assert!(err.to_string().contains("2 turns"));
        if let AdapterError::TurnBudget { pending_calls, .. } = err {
            assert_eq!(pending_calls[0].name, "add");
        } else {
            unreachable!();
        }
    }
}
