// ABOUTME: Git wrapper tools: status, diff, and log over the policy-gated executor.
// ABOUTME: Each tool builds a fixed argv so the model cannot smuggle arbitrary flags.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use muster_core::{
    Arguments, CoreError, JsonMap, Outcome, ToolHandler, ToolRegistry, ToolSpec,
};

use crate::policy::CommandPolicy;
use crate::tools::shell::run_command;

fn git_handler(
    policy: Arc<dyn CommandPolicy>,
    build_argv: impl Fn(&JsonMap) -> Vec<String> + Send + Sync + 'static,
) -> Arc<dyn ToolHandler> {
    Arc::new(
        move |cancel: CancellationToken, args: JsonMap| -> BoxFuture<'static, anyhow::Result<Outcome>> {
            let policy = Arc::clone(&policy);
            let argv = build_argv(&args);
            Box::pin(async move {
                let (allowed, reason) = policy.is_allowed("git");
                if !allowed {
                    return Ok(Outcome::text(format!("denied: {reason}")));
                }
                let output = run_command(&cancel, "git", &argv).await?;
                Ok(Outcome::text(output))
            })
        },
    )
}

pub fn register_git_tools(
    registry: &mut ToolRegistry,
    policy: Arc<dyn CommandPolicy>,
) -> Result<(), CoreError> {
    registry.register(
        ToolSpec::new(
            "git.status",
            "Show the working tree status, short format.",
            json!({"type": "object", "properties": {}, "required": []}),
        ),
        git_handler(Arc::clone(&policy), |_args| {
            vec!["status".into(), "--short".into(), "--branch".into()]
        }),
    )?;

    registry.register(
        ToolSpec::new(
            "git.diff",
            "Show unstaged changes, optionally limited to one path.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Limit the diff to this path."}
                },
                "required": []
            }),
        ),
        git_handler(Arc::clone(&policy), |args| {
            let mut argv = vec!["diff".to_string()];
            if let Some(path) = Arguments::new(args).str("path") {
                argv.push("--".to_string());
                argv.push(path.to_string());
            }
            argv
        }),
    )?;

    registry.register(
        ToolSpec::new(
            "git.log",
            "Show recent commits, one line each.",
            json!({
                "type": "object",
                "properties": {
                    "count": {"type": "integer", "description": "Number of commits, default 10."}
                },
                "required": []
            }),
        ),
        git_handler(policy, |args| {
            let count = Arguments::new(args).i64_or("count", 10).clamp(1, 200);
            vec![
                "log".to_string(),
                "--oneline".to_string(),
                "-n".to_string(),
                count.to_string(),
            ]
        }),
    )?;

    Ok(())
}
