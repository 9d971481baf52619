// ABOUTME: Error types shared across the core crate.
// ABOUTME: CoreError covers configuration and user-input failures; ToolError covers tool dispatch.

use thiserror::Error;

/// Errors raised while loading configuration or validating user input.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    UserInput(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised by the tool registry and the batch scheduler.
///
/// Handler failures and panics are not errors here: they are folded into
/// continue-state outcomes so the model can recover. Only cancellation
/// propagates as an error.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool run cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_detail() {
        let err = CoreError::Config("missing model L2".to_string());
        assert!(err.to_string().contains("missing model L2"));

        let err = CoreError::UserInput("empty query".to_string());
        assert!(err.to_string().contains("empty query"));

        assert!(ToolError::Cancelled.to_string().contains("cancelled"));
    }
}
