// ABOUTME: Agent definitions and the agent registry loaded from configuration.
// ABOUTME: Registry construction validates name uniqueness and rejects dependency cycles.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::model::Level;

/// Names of the advice hooks bound to an agent. Empty options mean no hook.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdviceBinding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub around: Option<String>,
}

/// A named agent: instruction template, model level, allowed tools,
/// dependency agents, and hooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDef {
    pub name: String,
    #[serde(default)]
    pub display: String,
    #[serde(default)]
    pub instruction: String,
    pub model_level: Level,
    #[serde(default)]
    pub tool_names: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    #[serde(default)]
    pub advice: AdviceBinding,
}

impl AgentDef {
    pub fn new(name: impl Into<String>, model_level: Level) -> Self {
        let name = name.into();
        Self {
            display: name.clone(),
            name,
            instruction: String::new(),
            model_level,
            tool_names: Vec::new(),
            dependencies: Vec::new(),
            entrypoint: None,
            advice: AdviceBinding::default(),
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn with_tools(mut self, tools: &[&str]) -> Self {
        self.tool_names = tools.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_dependencies(mut self, deps: &[&str]) -> Self {
        self.dependencies = deps.iter().map(|d| d.to_string()).collect();
        self
    }
}

/// Read-only map of agent name -> definition, loaded once per process.
#[derive(Debug)]
pub struct AgentRegistry {
    agents: HashMap<String, AgentDef>,
}

impl AgentRegistry {
    /// Build a registry, rejecting duplicate names, unknown dependencies,
    /// and dependency cycles.
    pub fn from_defs(defs: Vec<AgentDef>) -> Result<Self, CoreError> {
        let mut agents = HashMap::with_capacity(defs.len());
        for def in defs {
            if agents.contains_key(&def.name) {
                return Err(CoreError::Config(format!(
                    "duplicate agent name: {}",
                    def.name
                )));
            }
            agents.insert(def.name.clone(), def);
        }

        for def in agents.values() {
            for dep in &def.dependencies {
                if !agents.contains_key(dep) {
                    return Err(CoreError::Config(format!(
                        "agent {} depends on unknown agent {}",
                        def.name, dep
                    )));
                }
            }
        }

        let registry = Self { agents };
        registry.check_cycles()?;
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&AgentDef> {
        self.agents.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    fn check_cycles(&self) -> Result<(), CoreError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit(
            name: &str,
            agents: &HashMap<String, AgentDef>,
            marks: &mut HashMap<String, Mark>,
        ) -> Result<(), CoreError> {
            match marks.get(name) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    return Err(CoreError::Config(format!(
                        "cyclic agent dependency involving {name}"
                    )));
                }
                None => {}
            }
            marks.insert(name.to_string(), Mark::Visiting);
            if let Some(def) = agents.get(name) {
                for dep in &def.dependencies {
                    visit(dep, agents, marks)?;
                }
            }
            marks.insert(name.to_string(), Mark::Done);
            Ok(())
        }

        let mut marks = HashMap::new();
        for name in self.agents.keys() {
            visit(name, &self.agents, &mut marks)?;
        }
        Ok(())
    }
}
