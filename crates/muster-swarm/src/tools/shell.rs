// ABOUTME: The sh.exec tool: policy-gated command execution with cancellation support.
// ABOUTME: Denied commands short-circuit to a continue-state result without spawning anything.

use std::process::Stdio;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use muster_core::{
    Arguments, CoreError, JsonMap, Outcome, ToolHandler, ToolRegistry, ToolSpec,
};

use crate::policy::CommandPolicy;

const MAX_OUTPUT: usize = 20_000;

/// Run a program with arguments, honouring cancellation. The child is
/// killed when the future is dropped.
pub(crate) async fn run_command(
    cancel: &CancellationToken,
    program: &str,
    args: &[String],
) -> anyhow::Result<String> {
    tracing::debug!(command = %program, args = ?args, "spawning command");
    let child = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| anyhow::anyhow!("failed to start {program}: {e}"))?;

    let output = tokio::select! {
        _ = cancel.cancelled() => anyhow::bail!("{program}: cancelled"),
        out = child.wait_with_output() => out?,
    };

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    let combined = clip(&combined, MAX_OUTPUT);

    if !output.status.success() {
        anyhow::bail!("{program} exited with {}:\n{combined}", output.status);
    }
    Ok(combined)
}

pub(crate) fn clip(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n[truncated]", &text[..end])
}

pub(crate) fn string_array(args: &JsonMap, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

pub fn register_shell_tools(
    registry: &mut ToolRegistry,
    policy: Arc<dyn CommandPolicy>,
) -> Result<(), CoreError> {
    let spec = ToolSpec::new(
        "sh.exec",
        "Execute a command with arguments and return its combined output.",
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "The program to run."},
                "args": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Arguments passed to the program."
                }
            },
            "required": ["command"]
        }),
    );

    let handler: Arc<dyn ToolHandler> = Arc::new(
        move |cancel: CancellationToken, args: JsonMap| -> BoxFuture<'static, anyhow::Result<Outcome>> {
            let policy = Arc::clone(&policy);
            Box::pin(async move {
                let view = Arguments::new(&args);
                let Some(command) = view.str("command") else {
                    return Ok(Outcome::text("missing required argument: command"));
                };

                let (allowed, reason) = policy.is_allowed(command);
                if !allowed {
                    tracing::warn!(command = %command, reason = %reason, "command denied");
                    return Ok(Outcome::text(format!("denied: {reason}")));
                }

                let argv = string_array(&args, "args");
                let output = run_command(&cancel, command, &argv).await?;
                Ok(Outcome::text(output))
            })
        },
    );

    registry.register(spec, handler)
}
