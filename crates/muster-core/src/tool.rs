// ABOUTME: Tool registry: name -> handler map with JSON-schema specs for LLM advertisement.
// ABOUTME: Handler errors and panics fold into continue-state outcomes; only cancellation is an error.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, ToolError};
use crate::outcome::Outcome;

/// A JSON object, as decoded from model-emitted tool arguments.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// The model's request to invoke a named tool with JSON arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: JsonMap,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: JsonMap) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Declaration of a tool as advertised to the LLM: description plus a
/// JSON-schema `parameters` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object_schema")]
    pub parameters: serde_json::Value,
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}, "required": []})
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Typed getters over an argument map. Arguments arrive untyped from the
/// model; handlers must never assume a key exists or has the right shape.
pub struct Arguments<'a>(&'a JsonMap);

impl<'a> Arguments<'a> {
    pub fn new(map: &'a JsonMap) -> Self {
        Self(map)
    }

    pub fn str(&self, key: &str) -> Option<&'a str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    pub fn string_or(&self, key: &str, default: &str) -> String {
        self.str(key).unwrap_or(default).to_string()
    }

    pub fn i64(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(|v| v.as_i64())
    }

    pub fn i64_or(&self, key: &str, default: i64) -> i64 {
        self.i64(key).unwrap_or(default)
    }

    pub fn f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(|v| v.as_f64())
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(|v| v.as_bool())
    }

    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        self.bool(key).unwrap_or(default)
    }

    pub fn value(&self, key: &str) -> Option<&'a serde_json::Value> {
        self.0.get(key)
    }
}

/// The tool handler contract. Handlers receive a cancellation token they must
/// honour and the raw argument map; they return an outcome or an error that
/// the registry folds into a continue-state result.
pub trait ToolHandler: Send + Sync {
    fn call(
        &self,
        cancel: CancellationToken,
        args: JsonMap,
    ) -> BoxFuture<'static, anyhow::Result<Outcome>>;
}

impl<F> ToolHandler for F
where
    F: Fn(CancellationToken, JsonMap) -> BoxFuture<'static, anyhow::Result<Outcome>>
        + Send
        + Sync,
{
    fn call(
        &self,
        cancel: CancellationToken,
        args: JsonMap,
    ) -> BoxFuture<'static, anyhow::Result<Outcome>> {
        self(cancel, args)
    }
}

#[derive(Clone)]
struct RegisteredTool {
    spec: ToolSpec,
    handler: Arc<dyn ToolHandler>,
}

/// Name -> handler map. Built once at startup; per-request the runtime binds
/// a view containing only the tools the active agent declares.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Re-registration of a name fails and leaves the
    /// registry unchanged.
    pub fn register(
        &mut self,
        spec: ToolSpec,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), CoreError> {
        if self.tools.contains_key(&spec.name) {
            return Err(CoreError::Config(format!(
                "tool already registered: {}",
                spec.name
            )));
        }
        self.tools
            .insert(spec.name.clone(), RegisteredTool { spec, handler });
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn spec(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name).map(|t| &t.spec)
    }

    /// All specs, sorted by name, for advertising to the LLM.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|t| t.spec.clone()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// A view registry containing only the named tools. Unknown names are a
    /// configuration error.
    pub fn view(&self, names: &[String]) -> Result<ToolRegistry, CoreError> {
        let mut tools = HashMap::with_capacity(names.len());
        for name in names {
            let tool = self
                .tools
                .get(name)
                .ok_or_else(|| CoreError::Config(format!("unresolvable tool: {name}")))?;
            tools.insert(name.clone(), tool.clone());
        }
        Ok(ToolRegistry { tools })
    }

    /// Invoke a tool by name. A missing name yields a continue-state
    /// "unknown tool" outcome with no error; a failing or panicking handler
    /// is reported as a continue-state error outcome; cancellation
    /// propagates as `ToolError::Cancelled`.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        name: &str,
        args: &JsonMap,
    ) -> Result<Outcome, ToolError> {
        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }

        let Some(tool) = self.tools.get(name) else {
            tracing::warn!(tool = %name, "unknown tool requested");
            return Ok(Outcome::text(format!("unknown tool: {name}")));
        };

        let fut = tool.handler.call(cancel.clone(), args.clone());
        let mut handle = tokio::spawn(fut);

        tokio::select! {
            _ = cancel.cancelled() => {
                handle.abort();
                Err(ToolError::Cancelled)
            }
            joined = &mut handle => match joined {
                Ok(Ok(outcome)) => Ok(outcome),
                Ok(Err(err)) => {
                    tracing::debug!(tool = %name, error = %err, "tool handler failed");
                    Ok(Outcome::text(err.to_string()))
                }
                Err(join_err) if join_err.is_panic() => {
                    tracing::error!(tool = %name, "tool handler panicked");
                    Ok(Outcome::text(format!("tool panicked: {name}")))
                }
                Err(_) => Err(ToolError::Cancelled),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: serde_json::Value) -> JsonMap {
        value.as_object().unwrap().clone()
    }

    fn echo_handler() -> Arc<dyn ToolHandler> {
        Arc::new(|_cancel: CancellationToken, args: JsonMap| -> BoxFuture<'static, anyhow::Result<Outcome>> {
            Box::pin(async move {
                let text = Arguments::new(&args).string_or("text", "");
                Ok(Outcome::text(text))
            })
        })
    }

    fn spec(name: &str) -> ToolSpec {
        ToolSpec::new(name, "test tool", json!({"type": "object", "properties": {}}))
    }

    #[test]
    fn arguments_typed_getters() {
        let map = args(json!({"s": "hi", "n": 3, "f": 1.5, "b": true}));
        let a = Arguments::new(&map);

        assert_eq!(a.str("s"), Some("hi"));
        assert_eq!(a.str("missing"), None);
        assert_eq!(a.string_or("missing", "fallback"), "fallback");
        assert_eq!(a.i64("n"), Some(3));
        assert_eq!(a.i64_or("missing", 7), 7);
        assert_eq!(a.f64("f"), Some(1.5));
        assert_eq!(a.bool("b"), Some(true));
        assert!(!a.bool_or("missing", false));
        // wrong type reads as absent
        assert_eq!(a.str("n"), None);
        assert_eq!(a.i64("s"), None);
    }

    #[test]
    fn duplicate_registration_rejected_and_registry_unchanged() {
        let mut registry = ToolRegistry::new();
        registry.register(spec("echo"), echo_handler()).unwrap();
        let before = registry.names();

        let err = registry.register(spec("echo"), echo_handler()).unwrap_err();
        assert!(err.to_string().contains("already registered"));
        assert_eq!(registry.names(), before);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn view_binds_only_named_tools() {
        let mut registry = ToolRegistry::new();
        registry.register(spec("a"), echo_handler()).unwrap();
        registry.register(spec("b"), echo_handler()).unwrap();

        let view = registry.view(&["a".to_string()]).unwrap();
        assert!(view.contains("a"));
        assert!(!view.contains("b"));

        let err = registry.view(&["nope".to_string()]).unwrap_err();
        assert!(err.to_string().contains("unresolvable tool"));
    }

    #[tokio::test]
    async fn run_unknown_tool_yields_continue_outcome() {
        let registry = ToolRegistry::new();
        let cancel = CancellationToken::new();
        let out = registry
            .run(&cancel, "nope", &JsonMap::new())
            .await
            .unwrap();
        assert!(out.is_continue());
        assert!(out.value.contains("unknown tool"));
    }

    #[tokio::test]
    async fn run_invokes_handler_with_arguments() {
        let mut registry = ToolRegistry::new();
        registry.register(spec("echo"), echo_handler()).unwrap();
        let cancel = CancellationToken::new();

        let out = registry
            .run(&cancel, "echo", &args(json!({"text": "hello"})))
            .await
            .unwrap();
        assert_eq!(out.value, "hello");
    }

    #[tokio::test]
    async fn handler_error_encodes_as_continue_result() {
        let mut registry = ToolRegistry::new();
        let failing: Arc<dyn ToolHandler> = Arc::new(
            |_cancel: CancellationToken, _args: JsonMap| -> BoxFuture<'static, anyhow::Result<Outcome>> {
                Box::pin(async { Err(anyhow::anyhow!("boom")) })
            },
        );
        registry.register(spec("fail"), failing).unwrap();

        let cancel = CancellationToken::new();
        let out = registry.run(&cancel, "fail", &JsonMap::new()).await.unwrap();
        assert!(out.is_continue());
        assert_eq!(out.value, "boom");
    }

    #[tokio::test]
    async fn handler_panic_recovered_as_error_result() {
        let mut registry = ToolRegistry::new();
        let panicking: Arc<dyn ToolHandler> = Arc::new(
            |_cancel: CancellationToken, _args: JsonMap| -> BoxFuture<'static, anyhow::Result<Outcome>> {
                Box::pin(async { panic!("kaboom") })
            },
        );
        registry.register(spec("panics"), panicking).unwrap();

        let cancel = CancellationToken::new();
        let out = registry
            .run(&cancel, "panics", &JsonMap::new())
            .await
            .unwrap();
        assert!(out.is_continue());
        assert!(out.value.contains("panicked"));
    }

    #[tokio::test]
    async fn cancelled_run_propagates_error() {
        let mut registry = ToolRegistry::new();
        registry.register(spec("echo"), echo_handler()).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let res = registry.run(&cancel, "echo", &JsonMap::new()).await;
        assert!(matches!(res, Err(ToolError::Cancelled)));
    }
}
