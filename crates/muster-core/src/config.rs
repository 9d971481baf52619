// ABOUTME: YAML configuration: user identity, agents, tool declarations, models, and budgets.
// ABOUTME: ${VAR} references expand from the environment; validation happens at load time.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::agent::{AdviceBinding, AgentDef};
use crate::error::CoreError;
use crate::model::{Feature, Level, Model, WireApi};
use crate::tool::ToolSpec;

fn default_max_turns() -> usize {
    16
}

fn default_max_time() -> u64 {
    3600
}

fn default_max_history() -> usize {
    100
}

fn default_max_span_minutes() -> i64 {
    14400
}

fn default_instruction_role() -> String {
    "system".to_string()
}

fn default_parameters() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}, "required": []})
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionConfig {
    #[serde(default = "default_instruction_role")]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl Default for InstructionConfig {
    fn default() -> Self {
        Self {
            role: default_instruction_role(),
            content: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdvicesConfig {
    #[serde(default)]
    pub before: String,
    #[serde(default)]
    pub after: String,
    #[serde(default)]
    pub around: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default)]
    pub display: String,
    #[serde(default)]
    pub instruction: InstructionConfig,
    pub model: Level,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub entrypoint: String,
    #[serde(default)]
    pub advices: AdvicesConfig,
}

/// Declaration of a callable tool. The registry id is `label.service`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionConfig {
    pub label: String,
    pub service: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_parameters")]
    pub parameters: serde_json::Value,
}

impl FunctionConfig {
    pub fn id(&self) -> String {
        format!("{}.{}", self.label, self.service)
    }

    pub fn tool_spec(&self) -> ToolSpec {
        ToolSpec::new(self.id(), self.description.clone(), self.parameters.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// The level alias agents refer to (`L1`, `L2`, `L3`, `image`, `tts`).
    pub name: Level,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub api: WireApi,
}

/// The workbench configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkbenchConfig {
    #[serde(default)]
    pub user: UserConfig,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub functions: Vec<FunctionConfig>,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Wall-clock budget per run, in seconds.
    #[serde(default = "default_max_time")]
    pub max_time: u64,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Conversation memory window, in minutes.
    #[serde(default = "default_max_span_minutes")]
    pub max_span: i64,
    #[serde(default)]
    pub allow_list: Vec<String>,
    #[serde(default)]
    pub deny_list: Vec<String>,
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            user: UserConfig::default(),
            agents: Vec::new(),
            functions: Vec::new(),
            models: Vec::new(),
            max_turns: default_max_turns(),
            max_time: default_max_time(),
            max_history: default_max_history(),
            max_span: default_max_span_minutes(),
            allow_list: Vec::new(),
            deny_list: Vec::new(),
        }
    }
}

impl WorkbenchConfig {
    pub fn from_str(text: &str) -> Result<Self, CoreError> {
        let mut config: WorkbenchConfig = serde_yaml::from_str(text)
            .map_err(|e| CoreError::Config(format!("config parse error: {e}")))?;
        config.expand_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_str(&text)
    }

    /// Expand `${VAR}` references in credential and endpoint fields.
    fn expand_env(&mut self) {
        for model in &mut self.models {
            model.api_key = expand_env_refs(&model.api_key);
            model.base_url = expand_env_refs(&model.base_url);
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let mut seen_levels = HashSet::new();
        for model in &self.models {
            if model.provider.is_empty() {
                return Err(CoreError::Config(format!(
                    "model {}: provider must be set",
                    model.name
                )));
            }
            if model.model.is_empty() {
                return Err(CoreError::Config(format!(
                    "model {}: model id must be set",
                    model.name
                )));
            }
            if !seen_levels.insert(model.name) {
                return Err(CoreError::Config(format!(
                    "duplicate model level: {}",
                    model.name
                )));
            }
        }

        let mut seen_functions = HashSet::new();
        for function in &self.functions {
            if !seen_functions.insert(function.id()) {
                return Err(CoreError::Config(format!(
                    "duplicate function: {}",
                    function.id()
                )));
            }
        }

        // Agent-level checks (uniqueness, cycles) run in AgentRegistry.
        if self.max_turns == 0 {
            return Err(CoreError::Config("max_turns must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Agent definitions for registry construction.
    pub fn agent_defs(&self) -> Vec<AgentDef> {
        self.agents
            .iter()
            .map(|a| AgentDef {
                name: a.name.clone(),
                display: if a.display.is_empty() {
                    a.name.clone()
                } else {
                    a.display.clone()
                },
                instruction: a.instruction.content.clone(),
                model_level: a.model,
                tool_names: a.tools.clone(),
                dependencies: a.dependencies.clone(),
                entrypoint: if a.entrypoint.is_empty() {
                    None
                } else {
                    Some(a.entrypoint.clone())
                },
                advice: AdviceBinding {
                    before: none_if_empty(&a.advices.before),
                    after: none_if_empty(&a.advices.after),
                    around: none_if_empty(&a.advices.around),
                },
            })
            .collect()
    }

    /// The level -> model table used by the model loader.
    pub fn models_by_level(&self) -> HashMap<Level, Model> {
        self.models
            .iter()
            .map(|m| {
                (
                    m.name,
                    Model {
                        alias: m.name.to_string(),
                        provider: m.provider.clone(),
                        model_id: m.model.clone(),
                        base_url: m.base_url.clone(),
                        api_key: m.api_key.clone(),
                        features: m.features.iter().copied().collect(),
                        level: m.name,
                        api: m.api,
                    },
                )
            })
            .collect()
    }
}

fn none_if_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Replace `${NAME}` with the value of the environment variable `NAME`;
/// unset variables expand to empty.
fn expand_env_refs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find('}') {
            Some(end) => {
                let name = &rest[start + 2..start + 2 + end];
                out.push_str(&std::env::var(name).unwrap_or_default());
                rest = &rest[start + 2 + end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
