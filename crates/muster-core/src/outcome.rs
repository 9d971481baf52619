// ABOUTME: The Outcome type returned by tools and adapter calls, driving the turn loop.
// ABOUTME: FlowState selects between continuing the loop, exiting, and agent transfer.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::message::TEXT_PLAIN;

/// What the turn loop should do with a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowState {
    /// Feed the value back to the model and keep looping.
    #[default]
    Continue,
    /// Terminate the run with this value as the final answer.
    Exit,
    /// Hand control to `next_agent`, keeping the conversation history.
    Transfer,
}

/// The outcome of a tool invocation or an adapter call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    #[serde(default)]
    pub state: FlowState,
    #[serde(default = "default_mime")]
    pub mime_type: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_agent: Option<String>,
}

fn default_mime() -> String {
    TEXT_PLAIN.to_string()
}

impl Default for Outcome {
    fn default() -> Self {
        Self {
            state: FlowState::Continue,
            mime_type: TEXT_PLAIN.to_string(),
            value: String::new(),
            next_agent: None,
        }
    }
}

impl Outcome {
    /// A continue-state textual outcome.
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    /// A continue-state outcome with an explicit MIME type.
    pub fn with_mime(value: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            mime_type: mime_type.into(),
            ..Self::default()
        }
    }

    /// An exit-state outcome carrying the final value.
    pub fn exit(value: impl Into<String>) -> Self {
        Self {
            state: FlowState::Exit,
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn exit_with_mime(value: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            state: FlowState::Exit,
            value: value.into(),
            mime_type: mime_type.into(),
            ..Self::default()
        }
    }

    /// A transfer-state outcome naming the next agent. The constructor is the
    /// only way to build one, so `next_agent` is always populated.
    pub fn transfer(next_agent: impl Into<String>) -> Self {
        Self {
            state: FlowState::Transfer,
            next_agent: Some(next_agent.into()),
            ..Self::default()
        }
    }

    pub fn is_continue(&self) -> bool {
        self.state == FlowState::Continue
    }

    pub fn is_exit(&self) -> bool {
        self.state == FlowState::Exit
    }

    pub fn is_transfer(&self) -> bool {
        self.state == FlowState::Transfer
    }

    /// Check the transfer invariant on outcomes that crossed a serialization
    /// boundary and did not go through the constructors.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.state == FlowState::Transfer
            && self.next_agent.as_deref().unwrap_or("").is_empty()
        {
            return Err(CoreError::Config(
                "transfer outcome without a next agent".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_continue_text() {
        let out = Outcome::default();
        assert!(out.is_continue());
        assert_eq!(out.mime_type, TEXT_PLAIN);
        assert!(out.value.is_empty());
    }

    #[test]
    fn transfer_always_names_next_agent() {
        let out = Outcome::transfer("coder");
        assert!(out.is_transfer());
        assert_eq!(out.next_agent.as_deref(), Some("coder"));
        assert!(out.validate().is_ok());
    }

    #[test]
    fn validate_rejects_anonymous_transfer() {
        let out = Outcome {
            state: FlowState::Transfer,
            next_agent: None,
            ..Outcome::default()
        };
        assert!(out.validate().is_err());

        let out = Outcome {
            state: FlowState::Transfer,
            next_agent: Some(String::new()),
            ..Outcome::default()
        };
        assert!(out.validate().is_err());
    }

    #[test]
    fn outcome_serde_round_trip() {
        let out = Outcome::exit_with_mime("data:image/png;base64,AAAA", "image/png");
        let encoded = serde_json::to_string(&out).unwrap();
        let decoded: Outcome = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, out);
    }

    #[test]
    fn state_names_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&FlowState::Transfer).unwrap(),
            "\"transfer\""
        );
        assert_eq!(
            serde_json::from_str::<FlowState>("\"exit\"").unwrap(),
            FlowState::Exit
        );
    }
}
