// ABOUTME: Flow-control tools the model calls to end a run or hand off to another agent.
// ABOUTME: agent.transfer yields a transfer outcome; agent.exit yields the final answer.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use muster_core::{
    Arguments, CoreError, JsonMap, Outcome, ToolHandler, ToolRegistry, ToolSpec,
};

pub fn register_flow_tools(registry: &mut ToolRegistry) -> Result<(), CoreError> {
    let transfer: Arc<dyn ToolHandler> = Arc::new(
        |_cancel: CancellationToken, args: JsonMap| -> BoxFuture<'static, anyhow::Result<Outcome>> {
            Box::pin(async move {
                let view = Arguments::new(&args);
                match view.str("agent") {
                    Some(agent) if !agent.is_empty() => Ok(Outcome::transfer(agent)),
                    _ => Ok(Outcome::text("missing required argument: agent")),
                }
            })
        },
    );
    registry.register(
        ToolSpec::new(
            "agent.transfer",
            "Hand the conversation to another agent, keeping the history.",
            json!({
                "type": "object",
                "properties": {
                    "agent": {"type": "string", "description": "Name of the agent to hand off to."}
                },
                "required": ["agent"]
            }),
        ),
        transfer,
    )?;

    let exit: Arc<dyn ToolHandler> = Arc::new(
        |_cancel: CancellationToken, args: JsonMap| -> BoxFuture<'static, anyhow::Result<Outcome>> {
            Box::pin(async move {
                let message = Arguments::new(&args).string_or("message", "");
                Ok(Outcome::exit(message))
            })
        },
    );
    registry.register(
        ToolSpec::new(
            "agent.exit",
            "End the run immediately with the given final answer.",
            json!({
                "type": "object",
                "properties": {
                    "message": {"type": "string", "description": "The final answer."}
                },
                "required": []
            }),
        ),
        exit,
    )?;

    Ok(())
}
