// ABOUTME: Bounded-parallel scheduler for one assistant turn's batch of tool calls.
// ABOUTME: Preserves input order, cancels the batch early on exit, and encodes errors as results.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::outcome::Outcome;
use crate::tool::{ToolCall, ToolRegistry};

/// Default bound on simultaneously executing tool handlers.
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// The scheduler entry point handed to adapters: run one batch of tool calls
/// and return the outcomes in input order.
#[async_trait]
pub trait BatchRunner: Send + Sync {
    async fn run_batch(
        &self,
        cancel: &CancellationToken,
        calls: &[ToolCall],
    ) -> Result<Vec<Outcome>, ToolError>;
}

/// Run a batch of tool calls against a registry.
///
/// Guarantees:
/// - at most `max_concurrency` handlers run at once;
/// - outcome `i` corresponds to call `i` regardless of completion order;
/// - an exit-state outcome cancels the batch's derived token (transfer does
///   not), and already-completed outcomes stay in place;
/// - a handler cancelled by the batch token encodes as a continue-state
///   "cancelled" result, while caller cancellation propagates as an error.
pub async fn run_batch(
    cancel: &CancellationToken,
    registry: &ToolRegistry,
    calls: &[ToolCall],
    max_concurrency: usize,
) -> Result<Vec<Outcome>, ToolError> {
    if calls.is_empty() {
        return Ok(Vec::new());
    }
    if cancel.is_cancelled() {
        return Err(ToolError::Cancelled);
    }

    // Single call: run inline on the calling task, no semaphore.
    if calls.len() == 1 {
        let call = &calls[0];
        let out = registry.run(cancel, &call.name, &call.arguments).await?;
        return Ok(vec![out]);
    }

    let batch = cancel.child_token();
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));

    let mut handles = Vec::with_capacity(calls.len());
    for call in calls.iter().cloned() {
        let registry = registry.clone();
        let batch = batch.clone();
        let semaphore = Arc::clone(&semaphore);
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let res = registry.run(&batch, &call.name, &call.arguments).await;
            if let Ok(out) = &res
                && out.is_exit()
            {
                tracing::debug!(tool = %call.name, "exit outcome, cancelling batch");
                batch.cancel();
            }
            res
        }));
    }

    // Awaiting the handles in spawn order keeps outcome i aligned with call i.
    let mut outcomes = Vec::with_capacity(calls.len());
    for handle in handles {
        match handle.await {
            Ok(Ok(out)) => outcomes.push(out),
            Ok(Err(ToolError::Cancelled)) => {
                if cancel.is_cancelled() {
                    return Err(ToolError::Cancelled);
                }
                outcomes.push(Outcome::text("cancelled"));
            }
            Err(_) => outcomes.push(Outcome::text("tool task failed")),
        }
    }
    Ok(outcomes)
}

/// A `BatchRunner` binding a tool registry view to a concurrency bound.
/// This is what the swarm hands to adapters for each request.
pub struct RegistryRunner {
    registry: ToolRegistry,
    max_concurrency: usize,
}

impl RegistryRunner {
    pub fn new(registry: ToolRegistry, max_concurrency: usize) -> Self {
        Self {
            registry,
            max_concurrency,
        }
    }
}

#[async_trait]
impl BatchRunner for RegistryRunner {
    async fn run_batch(
        &self,
        cancel: &CancellationToken,
        calls: &[ToolCall],
    ) -> Result<Vec<Outcome>, ToolError> {
        run_batch(cancel, &self.registry, calls, self.max_concurrency).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{JsonMap, ToolHandler, ToolSpec};
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn spec(name: &str) -> ToolSpec {
        ToolSpec::new(name, "", serde_json::json!({"type": "object"}))
    }

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall::new(id, name, JsonMap::new())
    }

    /// A handler that sleeps for `ms` then echoes `name`, returning early
    /// with "interrupted" if the batch token fires first.
    fn sleeper(name: &'static str, ms: u64) -> Arc<dyn ToolHandler> {
        Arc::new(
            move |cancel: CancellationToken, _args: JsonMap| -> BoxFuture<'static, anyhow::Result<Outcome>> {
                Box::pin(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => Ok(Outcome::text("interrupted")),
                        _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(Outcome::text(name)),
                    }
                })
            },
        )
    }

    fn exiter(value: &'static str, ms: u64) -> Arc<dyn ToolHandler> {
        Arc::new(
            move |_cancel: CancellationToken, _args: JsonMap| -> BoxFuture<'static, anyhow::Result<Outcome>> {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok(Outcome::exit(value))
                })
            },
        )
    }

    #[tokio::test]
    async fn empty_batch_returns_empty_vec() {
        let registry = ToolRegistry::new();
        let cancel = CancellationToken::new();
        let out = run_batch(&cancel, &registry, &[], 8).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn single_call_runs_inline() {
        let mut registry = ToolRegistry::new();
        registry.register(spec("a"), sleeper("a", 0)).unwrap();

        let cancel = CancellationToken::new();
        let out = run_batch(&cancel, &registry, &[call("1", "a")], 8)
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].value, "a");
    }

    #[tokio::test]
    async fn results_preserve_input_order_despite_completion_order() {
        let mut registry = ToolRegistry::new();
        registry.register(spec("a"), sleeper("a", 120)).unwrap();
        registry.register(spec("b"), sleeper("b", 30)).unwrap();
        registry.register(spec("c"), sleeper("c", 70)).unwrap();

        let cancel = CancellationToken::new();
        let start = Instant::now();
        let out = run_batch(
            &cancel,
            &registry,
            &[call("1", "a"), call("2", "b"), call("3", "c")],
            8,
        )
        .await
        .unwrap();

        let values: Vec<&str> = out.iter().map(|o| o.value.as_str()).collect();
        assert_eq!(values, vec!["a", "b", "c"]);
        // ran in parallel: bounded by the slowest, not the sum
        assert!(start.elapsed() < Duration::from_millis(300));
    }

    #[tokio::test]
    async fn concurrency_bound_is_respected() {
        static RUNNING: AtomicUsize = AtomicUsize::new(0);
        static PEAK: AtomicUsize = AtomicUsize::new(0);

        let counted: Arc<dyn ToolHandler> = Arc::new(
            |_cancel: CancellationToken, _args: JsonMap| -> BoxFuture<'static, anyhow::Result<Outcome>> {
                Box::pin(async {
                    let now = RUNNING.fetch_add(1, Ordering::SeqCst) + 1;
                    PEAK.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    RUNNING.fetch_sub(1, Ordering::SeqCst);
                    Ok(Outcome::text("done"))
                })
            },
        );

        let mut registry = ToolRegistry::new();
        registry.register(spec("counted"), counted).unwrap();

        let calls: Vec<ToolCall> = (0..10).map(|i| call(&i.to_string(), "counted")).collect();
        let cancel = CancellationToken::new();
        let out = run_batch(&cancel, &registry, &calls, 2).await.unwrap();

        assert_eq!(out.len(), 10);
        assert!(
            PEAK.load(Ordering::SeqCst) <= 2,
            "peak concurrency {} exceeded bound",
            PEAK.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn concurrency_one_serialises_handlers() {
        let mut registry = ToolRegistry::new();
        registry.register(spec("a"), sleeper("a", 20)).unwrap();
        registry.register(spec("b"), sleeper("b", 20)).unwrap();

        let cancel = CancellationToken::new();
        let start = Instant::now();
        let out = run_batch(&cancel, &registry, &[call("1", "a"), call("2", "b")], 1)
            .await
            .unwrap();
        assert_eq!(out[0].value, "a");
        assert_eq!(out[1].value, "b");
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn exit_cancels_remaining_handlers_early() {
        let mut registry = ToolRegistry::new();
        registry.register(spec("quick"), exiter("done", 10)).unwrap();
        registry.register(spec("slow"), sleeper("slow", 500)).unwrap();

        let cancel = CancellationToken::new();
        let start = Instant::now();
        let out = run_batch(
            &cancel,
            &registry,
            &[call("1", "quick"), call("2", "slow")],
            8,
        )
        .await
        .unwrap();

        assert!(start.elapsed() < Duration::from_millis(250));
        assert!(out[0].is_exit());
        assert_eq!(out[0].value, "done");
        // the slow handler was interrupted but still has a slot, in place
        assert!(out[1].is_continue());
        // caller token is untouched
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn transfer_does_not_cancel_the_batch() {
        let transferrer: Arc<dyn ToolHandler> = Arc::new(
            |_cancel: CancellationToken, _args: JsonMap| -> BoxFuture<'static, anyhow::Result<Outcome>> {
                Box::pin(async { Ok(Outcome::transfer("coder")) })
            },
        );

        let mut registry = ToolRegistry::new();
        registry.register(spec("handoff"), transferrer).unwrap();
        registry.register(spec("slow"), sleeper("slow", 80)).unwrap();

        let cancel = CancellationToken::new();
        let out = run_batch(
            &cancel,
            &registry,
            &[call("1", "handoff"), call("2", "slow")],
            8,
        )
        .await
        .unwrap();

        assert!(out[0].is_transfer());
        assert_eq!(out[1].value, "slow", "batch completes on transfer");
    }

    #[tokio::test]
    async fn handler_error_encoded_in_place() {
        let failing: Arc<dyn ToolHandler> = Arc::new(
            |_cancel: CancellationToken, _args: JsonMap| -> BoxFuture<'static, anyhow::Result<Outcome>> {
                Box::pin(async { Err(anyhow::anyhow!("no such host")) })
            },
        );

        let mut registry = ToolRegistry::new();
        registry.register(spec("net"), failing).unwrap();
        registry.register(spec("ok"), sleeper("ok", 0)).unwrap();

        let cancel = CancellationToken::new();
        let out = run_batch(&cancel, &registry, &[call("1", "net"), call("2", "ok")], 8)
            .await
            .unwrap();
        assert!(out[0].is_continue());
        assert_eq!(out[0].value, "no such host");
        assert_eq!(out[1].value, "ok");
    }

    #[tokio::test]
    async fn caller_cancellation_propagates() {
        let mut registry = ToolRegistry::new();
        registry.register(spec("slow"), sleeper("slow", 500)).unwrap();

        let cancel = CancellationToken::new();
        let calls = vec![call("1", "slow"), call("2", "slow")];

        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel_clone.cancel();
        });

        let res = run_batch(&cancel, &registry, &calls, 8).await;
        assert!(matches!(res, Err(ToolError::Cancelled)));
    }

    #[tokio::test]
    async fn registry_runner_bridges_to_run_batch() {
        let mut registry = ToolRegistry::new();
        registry.register(spec("a"), sleeper("a", 0)).unwrap();

        let runner = RegistryRunner::new(registry, DEFAULT_MAX_CONCURRENCY);
        let cancel = CancellationToken::new();
        let out = runner
            .run_batch(&cancel, &[call("1", "a")])
            .await
            .unwrap();
        assert_eq!(out[0].value, "a");
    }
}
