// ABOUTME: Named advice hooks (before/after/around) and entrypoints applied around adapter calls.
// ABOUTME: Around advice receives the continuation and may short-circuit by not awaiting it.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;

use muster_core::{AdviceBinding, AgentDef, Vars};
use muster_llm::{ChatRequest, ChatResponse};

use crate::error::SwarmError;

/// Runs before the adapter call; may mutate the vars and the request.
pub type BeforeAdvice =
    Arc<dyn Fn(&mut Vars, &mut ChatRequest) -> Result<(), SwarmError> + Send + Sync>;

/// Runs after the adapter call; may post-process the response.
pub type AfterAdvice =
    Arc<dyn Fn(&mut Vars, &mut ChatResponse) -> Result<(), SwarmError> + Send + Sync>;

/// The adapter call as a future the around advice can await, wrap, or drop.
pub type Continuation = BoxFuture<'static, Result<ChatResponse, SwarmError>>;

/// Wraps the adapter call. Returning a future that never awaits the
/// continuation short-circuits the exchange.
pub type AroundAdvice = Arc<dyn Fn(Continuation) -> Continuation + Send + Sync>;

/// Runs before instruction rendering; may seed vars for the agent.
pub type EntrypointFn =
    Arc<dyn Fn(&mut Vars, &AgentDef) -> Result<(), SwarmError> + Send + Sync>;

/// Named registries for the hooks agents bind to in configuration.
#[derive(Clone, Default)]
pub struct AdviceRegistry {
    before: HashMap<String, BeforeAdvice>,
    after: HashMap<String, AfterAdvice>,
    around: HashMap<String, AroundAdvice>,
    entrypoints: HashMap<String, EntrypointFn>,
}

impl AdviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_before(&mut self, name: impl Into<String>, advice: BeforeAdvice) {
        self.before.insert(name.into(), advice);
    }

    pub fn register_after(&mut self, name: impl Into<String>, advice: AfterAdvice) {
        self.after.insert(name.into(), advice);
    }

    pub fn register_around(&mut self, name: impl Into<String>, advice: AroundAdvice) {
        self.around.insert(name.into(), advice);
    }

    pub fn register_entrypoint(&mut self, name: impl Into<String>, hook: EntrypointFn) {
        self.entrypoints.insert(name.into(), hook);
    }

    pub fn before(&self, name: &str) -> Result<BeforeAdvice, SwarmError> {
        self.before
            .get(name)
            .cloned()
            .ok_or_else(|| SwarmError::Config(format!("unknown before advice: {name}")))
    }

    pub fn after(&self, name: &str) -> Result<AfterAdvice, SwarmError> {
        self.after
            .get(name)
            .cloned()
            .ok_or_else(|| SwarmError::Config(format!("unknown after advice: {name}")))
    }

    pub fn around(&self, name: &str) -> Result<AroundAdvice, SwarmError> {
        self.around
            .get(name)
            .cloned()
            .ok_or_else(|| SwarmError::Config(format!("unknown around advice: {name}")))
    }

    pub fn entrypoint(&self, name: &str) -> Result<EntrypointFn, SwarmError> {
        self.entrypoints
            .get(name)
            .cloned()
            .ok_or_else(|| SwarmError::Config(format!("unknown entrypoint: {name}")))
    }

    /// Verify every hook an agent binds resolves here. Run at build time so
    /// bad bindings fail before any request.
    pub fn validate_binding(
        &self,
        agent: &str,
        binding: &AdviceBinding,
        entrypoint: Option<&str>,
    ) -> Result<(), SwarmError> {
        if let Some(name) = &binding.before {
            self.before(name)
                .map_err(|_| bad_binding(agent, "before", name))?;
        }
        if let Some(name) = &binding.after {
            self.after(name)
                .map_err(|_| bad_binding(agent, "after", name))?;
        }
        if let Some(name) = &binding.around {
            self.around(name)
                .map_err(|_| bad_binding(agent, "around", name))?;
        }
        if let Some(name) = entrypoint {
            self.entrypoint(name)
                .map_err(|_| bad_binding(agent, "entrypoint", name))?;
        }
        Ok(())
    }
}

fn bad_binding(agent: &str, kind: &str, name: &str) -> SwarmError {
    SwarmError::Config(format!("agent {agent}: unknown {kind} hook {name}"))
}
