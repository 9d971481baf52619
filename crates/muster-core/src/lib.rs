// ABOUTME: Core library for muster, containing the shared data model and tool machinery.
// ABOUTME: Defines messages, outcomes, models, agents, the tool registry, and the batch scheduler.

pub mod agent;
pub mod config;
pub mod error;
pub mod message;
pub mod model;
pub mod outcome;
pub mod schedule;
pub mod tool;
pub mod vars;

pub use agent::{AdviceBinding, AgentDef, AgentRegistry};
pub use config::WorkbenchConfig;
pub use error::{CoreError, ToolError};
pub use message::{Message, Role, TEXT_PLAIN};
pub use model::{ConfigModelLoader, Feature, Level, Model, ModelLoader, WireApi};
pub use outcome::{FlowState, Outcome};
pub use schedule::{BatchRunner, DEFAULT_MAX_CONCURRENCY, RegistryRunner, run_batch};
pub use tool::{Arguments, JsonMap, ToolCall, ToolHandler, ToolRegistry, ToolSpec};
pub use vars::Vars;
