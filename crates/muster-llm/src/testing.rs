// ABOUTME: Scripted provider stubs for tests: deterministic responses, no real API calls.
// ABOUTME: The stubs drive the real inner turn loop so loop semantics are exercised end to end.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use muster_core::{Level, Message, Model, ToolCall, ToolSpec};

use crate::api::{Adapter, AdapterError, ChatRequest, ChatResponse};
use crate::turns::{ProviderExchange, ProviderTurn, run_turns};

/// One scripted provider reply: a final text or a batch of tool calls.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Text(String),
    Calls(Vec<ToolCall>),
}

impl ScriptStep {
    pub fn text(content: impl Into<String>) -> Self {
        ScriptStep::Text(content.into())
    }

    pub fn calls(calls: Vec<ToolCall>) -> Self {
        ScriptStep::Calls(calls)
    }

    fn into_turn(self) -> ProviderTurn {
        match self {
            ScriptStep::Text(content) => ProviderTurn::text(content),
            ScriptStep::Calls(calls) => ProviderTurn::calls(calls),
        }
    }
}

/// A model value for tests; the scripted stubs never dial it.
pub fn test_model() -> Model {
    Model {
        alias: "L2".to_string(),
        provider: "openai".to_string(),
        model_id: "stub-model".to_string(),
        base_url: "http://localhost:0".to_string(),
        api_key: "test-key".to_string(),
        features: Default::default(),
        level: Level::L2,
        api: Default::default(),
    }
}

/// A provider exchange that replays a fixed script of turns.
///
/// Exhausting the script is an invalid-response error so a test that makes
/// more wire calls than it scripted fails loudly.
pub struct ScriptedExchange {
    steps: Mutex<VecDeque<ScriptStep>>,
    calls: AtomicUsize,
    last_messages: Mutex<Vec<Message>>,
}

impl ScriptedExchange {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
        }
    }

    /// Number of wire exchanges made so far.
    pub fn calls_made(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The message list the most recent exchange was asked to send.
    pub fn last_messages(&self) -> Vec<Message> {
        self.last_messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderExchange for ScriptedExchange {
    async fn exchange(
        &self,
        _cancel: &CancellationToken,
        _model: &Model,
        messages: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<ProviderTurn, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_messages.lock().unwrap() = messages.to_vec();
        let step = self.steps.lock().unwrap().pop_front().ok_or_else(|| {
            AdapterError::InvalidResponse("scripted exchange exhausted".to_string())
        })?;
        Ok(step.into_turn())
    }
}

/// An adapter replaying per-agent scripts through the real inner loop.
/// Register it under the `chat` key to stub out every provider at once.
pub struct ScriptedAdapter {
    scripts: Mutex<HashMap<String, VecDeque<ScriptStep>>>,
    exchanges: AtomicUsize,
}

impl ScriptedAdapter {
    /// Script a single agent.
    pub fn new(agent: impl Into<String>, steps: Vec<ScriptStep>) -> Self {
        let mut scripts = HashMap::new();
        scripts.insert(agent.into(), VecDeque::from(steps));
        Self {
            scripts: Mutex::new(scripts),
            exchanges: AtomicUsize::new(0),
        }
    }

    /// Script several agents; each keeps its own cursor.
    pub fn for_agents(scripts: Vec<(&str, Vec<ScriptStep>)>) -> Self {
        Self {
            scripts: Mutex::new(
                scripts
                    .into_iter()
                    .map(|(agent, steps)| (agent.to_string(), VecDeque::from(steps)))
                    .collect(),
            ),
            exchanges: AtomicUsize::new(0),
        }
    }

    /// Total wire exchanges made across all agents.
    pub fn exchanges_made(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }

    fn next_step(&self, agent: &str) -> Result<ScriptStep, AdapterError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts.get_mut(agent).ok_or_else(|| {
            AdapterError::InvalidResponse(format!("no script for agent {agent}"))
        })?;
        queue.pop_front().ok_or_else(|| {
            AdapterError::InvalidResponse(format!("script exhausted for agent {agent}"))
        })
    }
}

struct AgentScriptExchange<'a> {
    adapter: &'a ScriptedAdapter,
    agent: String,
}

#[async_trait]
impl ProviderExchange for AgentScriptExchange<'_> {
    async fn exchange(
        &self,
        _cancel: &CancellationToken,
        _model: &Model,
        _messages: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<ProviderTurn, AdapterError> {
        Ok(self.adapter.next_step(&self.agent)?.into_turn())
    }
}

#[async_trait]
impl Adapter for ScriptedAdapter {
    async fn call(
        &self,
        cancel: &CancellationToken,
        request: &ChatRequest,
    ) -> Result<ChatResponse, AdapterError> {
        let exchange = AgentScriptExchange {
            adapter: self,
            agent: request.agent.clone(),
        };
        run_turns(&exchange, cancel, request).await
    }
}
