// ABOUTME: The run-level error taxonomy and its mapping to process exit codes.
// ABOUTME: Tool errors never reach here (they fold into results); everything else surfaces.

use thiserror::Error;

use muster_core::CoreError;
use muster_llm::AdapterError;
use muster_store::StoreError;

/// Errors a run can fail with. The CLI maps user-input errors to exit 2 and
/// everything else to exit 1.
#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("invalid input: {0}")]
    UserInput(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("tool error: {0}")]
    Tool(String),

    #[error("budget exceeded: {0}")]
    Budget(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl SwarmError {
    pub fn exit_code(&self) -> i32 {
        match self {
            SwarmError::UserInput(_) => 2,
            _ => 1,
        }
    }

    /// The failing stage, for debug logs.
    pub fn stage(&self) -> &'static str {
        match self {
            SwarmError::UserInput(_) => "input",
            SwarmError::Config(_) => "template",
            SwarmError::Transport(_) => "adapter",
            SwarmError::Tool(_) => "tool",
            SwarmError::Budget(_) => "budget",
            SwarmError::Cancelled => "adapter",
            SwarmError::Store(_) => "memory",
        }
    }
}

impl From<CoreError> for SwarmError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::UserInput(msg) => SwarmError::UserInput(msg),
            CoreError::Config(msg) => SwarmError::Config(msg),
        }
    }
}

impl From<AdapterError> for SwarmError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Transport(msg) => SwarmError::Transport(msg),
            AdapterError::InvalidResponse(msg) => SwarmError::Transport(msg),
            AdapterError::Unsupported(msg) => SwarmError::Config(msg),
            AdapterError::Cancelled => SwarmError::Cancelled,
            AdapterError::TurnBudget {
                turns,
                last_content,
                pending_calls,
            } => SwarmError::Budget(format!(
                "turn budget exhausted after {turns} turns; last content: {last_content:?}; \
                 pending tool calls: {}",
                pending_calls
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }
}
