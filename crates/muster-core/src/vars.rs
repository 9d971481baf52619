// ABOUTME: The per-run working set: user input, chat id, template data, and conversation history.
// ABOUTME: A Vars value is owned by one run and never shared mutably between concurrent runs.

use std::collections::HashMap;

use serde_json::Value;

use crate::message::Message;

/// Per-run mutable state. Created fresh for every top-level run; advices,
/// entrypoints, and dependency agents see mutations within that run only.
#[derive(Debug, Clone, Default)]
pub struct Vars {
    pub chat_id: String,
    pub user_input: String,
    pub user_name: String,
    pub user_display: String,
    pub os: String,
    pub arch: String,
    pub shell: String,
    /// Free-form template data; dependency agent outputs land here keyed by
    /// the dependency name.
    pub extra: HashMap<String, Value>,
    /// Conversation history for this run. The runtime appends the delta
    /// produced by the run; the caller owns the slice.
    pub history: Vec<Message>,
}

impl Vars {
    /// A Vars with process metadata captured from the environment.
    pub fn new() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            shell: std::env::var("SHELL").unwrap_or_default(),
            ..Self::default()
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.user_input = input.into();
        self
    }

    pub fn with_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = chat_id.into();
        self
    }

    pub fn set_extra(&mut self, key: impl Into<String>, value: Value) {
        self.extra.insert(key.into(), value);
    }

    pub fn get_extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Data exposed to instruction templates: process metadata, user
    /// identity, the input, and every extra entry flattened at top level
    /// (reserved keys win over extras).
    pub fn template_data(&self) -> Value {
        let mut data = serde_json::Map::new();
        for (key, value) in &self.extra {
            data.insert(key.clone(), value.clone());
        }
        data.insert("user".into(), Value::String(self.user_name.clone()));
        data.insert("display".into(), Value::String(self.user_display.clone()));
        data.insert("input".into(), Value::String(self.user_input.clone()));
        data.insert("os".into(), Value::String(self.os.clone()));
        data.insert("arch".into(), Value::String(self.arch.clone()));
        data.insert("shell".into(), Value::String(self.shell.clone()));
        Value::Object(data)
    }
}
