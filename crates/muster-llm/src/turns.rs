// ABOUTME: The shared inner turn loop: call the provider, run the tool batch, feed results back.
// ABOUTME: Applies the state tie-breaks (exit wins, first transfer wins) and the turn budget.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use muster_core::{BatchRunner as _, Message, Model, Outcome, ToolCall, ToolError, ToolSpec};

use crate::api::{AdapterError, ChatRequest, ChatResponse};

/// One wire exchange with a provider: the assistant text (possibly empty)
/// and the tool calls it requested.
#[derive(Debug, Clone, Default)]
pub struct ProviderTurn {
    pub content: String,
    pub mime_type: String,
    pub tool_calls: Vec<ToolCall>,
}

impl ProviderTurn {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            mime_type: muster_core::TEXT_PLAIN.to_string(),
            tool_calls: Vec::new(),
        }
    }

    pub fn calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: String::new(),
            mime_type: muster_core::TEXT_PLAIN.to_string(),
            tool_calls,
        }
    }
}

/// One provider round trip. Implementations translate the internal message
/// list into the vendor wire shape (role mapping, content parts, tool
/// schemas) and parse the reply back.
#[async_trait]
pub trait ProviderExchange: Send + Sync {
    async fn exchange(
        &self,
        cancel: &CancellationToken,
        model: &Model,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<ProviderTurn, AdapterError>;
}

/// Encode one tool outcome as feedback messages for the next provider call.
///
/// Text inlines verbatim; image and audio become a tool stub plus a user
/// message carrying the data URL; any other MIME type demotes to an error
/// tool result.
pub fn encode_tool_feedback(call: &ToolCall, outcome: &Outcome) -> Vec<Message> {
    let mime = outcome.mime_type.as_str();
    if mime.is_empty() || mime.starts_with("text/") {
        return vec![
            Message::tool(outcome.value.clone(), call.id.clone())
                .with_content_type(if mime.is_empty() {
                    muster_core::TEXT_PLAIN.to_string()
                } else {
                    mime.to_string()
                }),
        ];
    }
    if mime.starts_with("image/") || mime.starts_with("audio/") {
        return vec![
            Message::tool(
                "the result is included as a data URL in the next message",
                call.id.clone(),
            ),
            Message::user(outcome.value.clone()).with_content_type(mime.to_string()),
        ];
    }
    vec![Message::tool(
        format!("mimetype not supported: {mime}"),
        call.id.clone(),
    )]
}

/// Drive the provider-internal turn loop.
///
/// Each turn is one wire call plus the ensuing tool batch. The loop stops on
/// a final textual answer, an exit or transfer tool outcome, cancellation,
/// or when `max_turns` turns have elapsed with tools still pending (which
/// surfaces as `AdapterError::TurnBudget`).
pub async fn run_turns(
    exchange: &dyn ProviderExchange,
    cancel: &CancellationToken,
    request: &ChatRequest,
) -> Result<ChatResponse, AdapterError> {
    let mut messages = request.messages.clone();
    let mut added: Vec<Message> = Vec::new();
    let mut turns = 0usize;

    loop {
        if cancel.is_cancelled() {
            return Err(AdapterError::Cancelled);
        }

        let turn = exchange
            .exchange(cancel, &request.model, &messages, &request.tools)
            .await?;
        turns += 1;
        tracing::debug!(
            agent = %request.agent,
            turn = turns,
            tool_calls = turn.tool_calls.len(),
            "provider turn complete"
        );

        if turn.tool_calls.is_empty() {
            let outcome = Outcome::exit_with_mime(turn.content, turn.mime_type);
            added.push(
                Message::assistant(outcome.value.clone()).with_sender(request.agent.clone()),
            );
            return Ok(ChatResponse::new(outcome, added));
        }

        let assistant = Message::assistant(turn.content.clone())
            .with_sender(request.agent.clone())
            .with_tool_calls(turn.tool_calls.clone());
        messages.push(assistant.clone());
        added.push(assistant);

        let outcomes = request
            .runner
            .run_batch(cancel, &turn.tool_calls)
            .await
            .map_err(|e| match e {
                ToolError::Cancelled => AdapterError::Cancelled,
            })?;

        // Exit wins over transfer; among transfers the first in input order
        // wins. The loop returns without feeding that batch back.
        if let Some(out) = outcomes.iter().find(|o| o.is_exit()) {
            return Ok(ChatResponse::new(out.clone(), added));
        }
        if let Some(out) = outcomes.iter().find(|o| o.is_transfer()) {
            return Ok(ChatResponse::new(out.clone(), added));
        }

        for (call, outcome) in turn.tool_calls.iter().zip(outcomes.iter()) {
            for message in encode_tool_feedback(call, outcome) {
                messages.push(message.clone());
                added.push(message);
            }
        }

        if turns >= request.max_turns {
            return Err(AdapterError::TurnBudget {
                turns,
                last_content: turn.content,
                pending_calls: turn.tool_calls,
            });
        }
    }
}
