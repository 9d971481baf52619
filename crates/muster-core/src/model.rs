// ABOUTME: Model descriptors: provider, model id, endpoint, credentials, features, and level.
// ABOUTME: The ModelLoader resolves an agent's level alias to a concrete model with feature checks.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The "intelligence" level an agent asks for: basic, regular, advanced,
/// or a specialised output class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    L1,
    L2,
    L3,
    #[serde(rename = "image")]
    Image,
    #[serde(rename = "tts")]
    Tts,
    #[serde(rename = "any")]
    Any,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::L1 => "L1",
            Level::L2 => "L2",
            Level::L3 => "L3",
            Level::Image => "image",
            Level::Tts => "tts",
            Level::Any => "any",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "l1" => Ok(Level::L1),
            "l2" => Ok(Level::L2),
            "l3" => Ok(Level::L3),
            "image" => Ok(Level::Image),
            "tts" => Ok(Level::Tts),
            "any" => Ok(Level::Any),
            other => Err(CoreError::Config(format!("unknown model level: {other}"))),
        }
    }
}

/// Capabilities a model advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Feature {
    Vision,
    Tools,
    ImageOut,
    Tts,
}

/// Which wire API an OpenAI-compatible endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireApi {
    #[default]
    Chat,
    Responses,
}

/// A concrete model resolved from a level alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub alias: String,
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub features: HashSet<Feature>,
    pub level: Level,
    #[serde(default)]
    pub api: WireApi,
}

impl Model {
    /// Providers must be named explicitly; model-name sniffing is not done.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.provider.is_empty() {
            return Err(CoreError::Config(format!(
                "model {}: provider must be set",
                self.alias
            )));
        }
        if self.model_id.is_empty() {
            return Err(CoreError::Config(format!(
                "model {}: model id must be set",
                self.alias
            )));
        }
        Ok(())
    }

    pub fn supports(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }
}

/// Resolves a level to a concrete model. `load_with_features` additionally
/// verifies the model covers every feature the caller requires and fails
/// with a descriptive error otherwise.
pub trait ModelLoader: Send + Sync {
    fn load(&self, level: Level) -> Result<Model, CoreError>;

    fn load_with_features(
        &self,
        level: Level,
        required: &[Feature],
    ) -> Result<Model, CoreError> {
        let model = self.load(level)?;
        for feature in required {
            if !model.supports(*feature) {
                return Err(CoreError::Config(format!(
                    "model {} ({}) lacks required feature {:?}",
                    model.alias, model.model_id, feature
                )));
            }
        }
        Ok(model)
    }
}

/// A loader backed by the configuration's level -> model table.
pub struct ConfigModelLoader {
    models: HashMap<Level, Model>,
}

impl ConfigModelLoader {
    pub fn new(models: HashMap<Level, Model>) -> Self {
        Self { models }
    }
}

impl ModelLoader for ConfigModelLoader {
    fn load(&self, level: Level) -> Result<Model, CoreError> {
        if level == Level::Any {
            for candidate in [Level::L2, Level::L1, Level::L3] {
                if let Some(model) = self.models.get(&candidate) {
                    return Ok(model.clone());
                }
            }
            return self
                .models
                .values()
                .next()
                .cloned()
                .ok_or_else(|| CoreError::Config("no models configured".to_string()));
        }
        self.models
            .get(&level)
            .cloned()
            .ok_or_else(|| CoreError::Config(format!("no model configured for level {level}")))
    }
}
