// ABOUTME: The outer run loop: select agent, resolve dependencies, call the adapter, handle transfer.
// ABOUTME: Enforces the wall-clock budget and rounds the conversation through the memory store.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use muster_core::{
    AgentDef, AgentRegistry, ConfigModelLoader, DEFAULT_MAX_CONCURRENCY, Feature, JsonMap,
    Level, Message, ModelLoader, RegistryRunner, Role, ToolRegistry, Vars, WorkbenchConfig,
};
use muster_llm::{AdapterRegistry, ChatRequest, ChatResponse};
use muster_store::{LoadOptions, MemoryStore, VecMemory};

use crate::advice::{AdviceRegistry, Continuation};
use crate::error::SwarmError;
use crate::policy::{CommandPolicy, ListPolicy};
use crate::secrets::{EnvSecrets, SecretStore};
use crate::template;
use crate::tools::{BuiltinToolOptions, register_builtin_tools};

/// One user request: the target agent, the query, and optional per-request
/// parameters.
#[derive(Debug, Clone, Default)]
pub struct UserRequest {
    pub agent: String,
    pub input: String,
    pub chat_id: String,
    pub arguments: JsonMap,
}

impl UserRequest {
    pub fn new(agent: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            input: input.into(),
            chat_id: String::new(),
            arguments: JsonMap::new(),
        }
    }

    pub fn with_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = chat_id.into();
        self
    }

    pub fn with_arguments(mut self, arguments: JsonMap) -> Self {
        self.arguments = arguments;
        self
    }
}

/// The swarm runtime. Built once from explicit parts; each `run` drives one
/// user request to completion.
pub struct Swarm {
    config: WorkbenchConfig,
    agents: AgentRegistry,
    tools: ToolRegistry,
    adapters: AdapterRegistry,
    models: Arc<dyn ModelLoader>,
    memory: Arc<dyn MemoryStore>,
    advices: AdviceRegistry,
    max_concurrency: usize,
}

impl std::fmt::Debug for Swarm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Swarm")
            .field("max_concurrency", &self.max_concurrency)
            .finish_non_exhaustive()
    }
}

/// Assembles a Swarm. Every collaborator has a default: builtin tools gated
/// by the config's lists, the standard adapter wiring, the config-backed
/// model loader with env secrets, and an in-memory store.
pub struct SwarmBuilder {
    config: WorkbenchConfig,
    tools: Option<ToolRegistry>,
    adapters: Option<AdapterRegistry>,
    models: Option<Arc<dyn ModelLoader>>,
    memory: Option<Arc<dyn MemoryStore>>,
    advices: AdviceRegistry,
    secrets: Arc<dyn SecretStore>,
    policy: Option<Arc<dyn CommandPolicy>>,
    workspace: Option<PathBuf>,
    db_path: Option<PathBuf>,
    max_concurrency: usize,
}

impl SwarmBuilder {
    pub fn new(config: WorkbenchConfig) -> Self {
        Self {
            config,
            tools: None,
            adapters: None,
            models: None,
            memory: None,
            advices: AdviceRegistry::new(),
            secrets: Arc::new(EnvSecrets),
            policy: None,
            workspace: None,
            db_path: None,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = Some(adapters);
        self
    }

    pub fn with_models(mut self, models: Arc<dyn ModelLoader>) -> Self {
        self.models = Some(models);
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_advices(mut self, advices: AdviceRegistry) -> Self {
        self.advices = advices;
        self
    }

    pub fn with_secrets(mut self, secrets: Arc<dyn SecretStore>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn CommandPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_workspace(mut self, workspace: PathBuf) -> Self {
        self.workspace = Some(workspace);
        self
    }

    pub fn with_db(mut self, db_path: PathBuf) -> Self {
        self.db_path = Some(db_path);
        self
    }

    pub fn with_max_concurrency(mut self, bound: usize) -> Self {
        self.max_concurrency = bound.max(1);
        self
    }

    pub fn build(self) -> Result<Swarm, SwarmError> {
        let Self {
            config,
            tools,
            adapters,
            models,
            memory,
            advices,
            secrets,
            policy,
            workspace,
            db_path,
            max_concurrency,
        } = self;

        let agents = AgentRegistry::from_defs(config.agent_defs())?;

        let tools = match tools {
            Some(tools) => tools,
            None => {
                let policy = policy.unwrap_or_else(|| {
                    Arc::new(ListPolicy::new(
                        config.allow_list.clone(),
                        config.deny_list.clone(),
                    ))
                });
                let mut options = BuiltinToolOptions::new(policy);
                if let Some(workspace) = workspace {
                    options = options.with_workspace(workspace);
                }
                if let Some(db_path) = db_path {
                    options = options.with_db(db_path);
                }
                let mut registry = ToolRegistry::new();
                register_builtin_tools(&mut registry, &options)?;
                registry
            }
        };

        for function in &config.functions {
            if !tools.contains(&function.id()) {
                tracing::warn!(
                    function = %function.id(),
                    "declared function has no registered handler"
                );
            }
        }

        let models: Arc<dyn ModelLoader> = match models {
            Some(models) => models,
            None => {
                let mut table = config.models_by_level();
                for model in table.values_mut() {
                    if model.api_key.is_empty()
                        && let Ok(key) = secrets.get(&model.provider, "api_key")
                    {
                        model.api_key = key;
                    }
                }
                Arc::new(ConfigModelLoader::new(table))
            }
        };

        let adapters = adapters.unwrap_or_else(AdapterRegistry::defaults);
        let memory = memory.unwrap_or_else(|| Arc::new(VecMemory::new()));

        // Fail bad wiring at build time, not mid-run.
        for name in agents.names() {
            let Some(agent) = agents.get(&name) else {
                continue;
            };
            tools.view(&agent.tool_names)?;
            advices.validate_binding(&agent.name, &agent.advice, agent.entrypoint.as_deref())?;
        }

        Ok(Swarm {
            config,
            agents,
            tools,
            adapters,
            models,
            memory,
            advices,
            max_concurrency,
        })
    }
}

impl Swarm {
    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn config(&self) -> &WorkbenchConfig {
        &self.config
    }

    pub async fn run(
        &self,
        vars: &mut Vars,
        request: UserRequest,
    ) -> Result<ChatResponse, SwarmError> {
        let cancel = CancellationToken::new();
        self.run_with_cancel(&cancel, vars, request).await
    }

    /// Drive one user request: select the agent, run exchanges (following
    /// transfers), and persist the conversation delta on exit.
    pub async fn run_with_cancel(
        &self,
        cancel: &CancellationToken,
        vars: &mut Vars,
        request: UserRequest,
    ) -> Result<ChatResponse, SwarmError> {
        let query = request.input.trim().to_string();
        if query.is_empty() {
            return Err(SwarmError::UserInput("empty query".to_string()));
        }
        let mut active = self
            .agents
            .get(&request.agent)
            .cloned()
            .ok_or_else(|| {
                SwarmError::UserInput(format!("unknown agent: {}", request.agent))
            })?;

        vars.user_input = query.clone();
        if !request.chat_id.is_empty() {
            vars.chat_id = request.chat_id.clone();
        }
        if vars.user_name.is_empty() {
            vars.user_name = self.config.user.name.clone();
        }
        if vars.user_display.is_empty() {
            vars.user_display = self.config.user.display.clone();
        }

        let deadline = Instant::now() + Duration::from_secs(self.config.max_time);

        if vars.history.is_empty() {
            let mut options = LoadOptions {
                max_history: self.config.max_history,
                max_span: self.config.max_span,
                roles: Some(vec![Role::User, Role::Assistant]),
                chat_id: None,
            };
            if !vars.chat_id.is_empty() {
                options.chat_id = Some(vars.chat_id.clone());
            }
            vars.history = self.memory.load(&options)?;
        }

        let mut working_history = vars.history.clone();
        let user_message = {
            let mut message = Message::user(query).with_chat_id(vars.chat_id.clone());
            if !vars.user_name.is_empty() {
                message = message.with_sender(vars.user_name.clone());
            }
            message
        };

        tracing::info!(agent = %active.name, "run started");

        loop {
            if cancel.is_cancelled() {
                return Err(SwarmError::Cancelled);
            }
            if Instant::now() >= deadline {
                tracing::debug!(stage = "budget", agent = %active.name, "deadline passed");
                return Err(SwarmError::Budget("wall-clock budget exceeded".to_string()));
            }

            self.resolve_dependencies(&active, vars, &working_history, cancel, deadline)
                .await?;

            let (instruction, mut response) = self
                .run_exchange(
                    &active,
                    vars,
                    &working_history,
                    &user_message,
                    &request.arguments,
                    cancel,
                    deadline,
                )
                .await?;

            if let Some(name) = active.advice.after.clone() {
                (self.advices.after(&name)?)(vars, &mut response)?;
            }

            if response.outcome.is_transfer() {
                let next = response
                    .outcome
                    .next_agent
                    .clone()
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| {
                        SwarmError::Config("transfer outcome without a next agent".to_string())
                    })?;
                let next_def = self.agents.get(&next).cloned().ok_or_else(|| {
                    SwarmError::Config(format!("transfer to unknown agent: {next}"))
                })?;
                tracing::info!(from = %active.name, to = %next, "agent transfer");
                // Drop pending tool calls: their results never fed back, and
                // providers reject assistant tool calls with no replies.
                working_history.extend(response.messages.iter().cloned().map(|mut m| {
                    m.tool_calls = Vec::new();
                    m
                }));
                active = next_def;
                continue;
            }

            // exit: persist [system, user, exchanges...] and hand the caller
            // its history delta
            let mut delta = Vec::new();
            if !instruction.is_empty() {
                delta.push(Message::system(instruction));
            }
            delta.push(user_message.clone());
            delta.extend(working_history[vars.history.len()..].iter().cloned());
            delta.extend(response.messages.iter().cloned());
            for message in &mut delta {
                message.chat_id = vars.chat_id.clone();
            }

            vars.history.extend(delta.iter().cloned());
            self.memory.save(&delta)?;
            tracing::info!(agent = %active.name, messages = delta.len(), "run complete");
            return Ok(response);
        }
    }

    /// Invoke each dependency agent in sequence, stashing its result value
    /// in `vars.extra` under the dependency name. Already-resolved names are
    /// skipped; cycles were rejected at load time.
    async fn resolve_dependencies(
        &self,
        agent: &AgentDef,
        vars: &mut Vars,
        history: &[Message],
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> Result<(), SwarmError> {
        for dep_name in agent.dependencies.clone() {
            if vars.get_extra(&dep_name).is_some() {
                continue;
            }
            let dep = self.agents.get(&dep_name).cloned().ok_or_else(|| {
                SwarmError::Config(format!("unknown dependency agent: {dep_name}"))
            })?;

            Box::pin(self.resolve_dependencies(&dep, vars, history, cancel, deadline)).await?;

            let dep_input = Message::user(vars.user_input.clone());
            let empty_args = JsonMap::new();
            let (_, response) = Box::pin(self.run_exchange(
                &dep,
                vars,
                history,
                &dep_input,
                &empty_args,
                cancel,
                deadline,
            ))
            .await?;

            tracing::debug!(dependency = %dep_name, "dependency resolved");
            vars.set_extra(dep_name, serde_json::Value::String(response.outcome.value));
        }
        Ok(())
    }

    /// One adapter exchange for one agent: entrypoint, instruction render,
    /// model resolution, tool binding, advices, and the (deadline-bounded)
    /// adapter call. Returns the rendered instruction with the response.
    #[allow(clippy::too_many_arguments)]
    async fn run_exchange(
        &self,
        agent: &AgentDef,
        vars: &mut Vars,
        history: &[Message],
        user_message: &Message,
        arguments: &JsonMap,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> Result<(String, ChatResponse), SwarmError> {
        if let Some(name) = &agent.entrypoint {
            (self.advices.entrypoint(name)?)(vars, agent)?;
        }

        let instruction = template::render(&agent.instruction, &vars.template_data())?;

        let mut messages = Vec::with_capacity(history.len() + 2);
        if !instruction.is_empty() {
            messages.push(Message::system(instruction.clone()));
        }
        messages.extend(history.iter().cloned());
        messages.push(user_message.clone());

        let model = self
            .models
            .load_with_features(agent.model_level, &required_features(agent))?;
        model.validate()?;

        let view = self.tools.view(&agent.tool_names)?;
        let specs = view.specs();
        let runner = Arc::new(RegistryRunner::new(view, self.max_concurrency));

        let mut chat_request = ChatRequest::new(
            agent.name.clone(),
            model,
            messages,
            specs,
            self.config.max_turns,
            runner,
        )
        .with_arguments(arguments.clone());

        if let Some(name) = &agent.advice.before {
            (self.advices.before(name)?)(vars, &mut chat_request)?;
        }

        let adapter = self
            .adapters
            .get(AdapterRegistry::key_for_level(agent.model_level))?;

        let exchange_cancel = cancel.child_token();
        let call: Continuation = {
            let adapter = Arc::clone(&adapter);
            let token = exchange_cancel.clone();
            let request = chat_request.clone();
            let agent_name = agent.name.clone();
            async move {
                tracing::debug!(agent = %agent_name, "invoking adapter");
                adapter.call(&token, &request).await.map_err(SwarmError::from)
            }
            .boxed()
        };
        let call = match &agent.advice.around {
            Some(name) => (self.advices.around(name)?)(call),
            None => call,
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        let response = match tokio::time::timeout(remaining, call).await {
            Ok(result) => result?,
            Err(_) => {
                exchange_cancel.cancel();
                tracing::debug!(stage = "budget", agent = %agent.name, "exchange timed out");
                return Err(SwarmError::Budget("wall-clock budget exceeded".to_string()));
            }
        };
        Ok((instruction, response))
    }
}

/// Features a model must advertise before this agent can use it.
fn required_features(agent: &AgentDef) -> Vec<Feature> {
    let mut required = Vec::new();
    if !agent.tool_names.is_empty() {
        required.push(Feature::Tools);
    }
    match agent.model_level {
        Level::Image => required.push(Feature::ImageOut),
        Level::Tts => required.push(Feature::Tts),
        _ => {}
    }
    required
}
