// ABOUTME: The swarm runtime: agent selection, the outer turn loop, advices, and builtin tools.
// ABOUTME: Orchestrates agents, adapters, tools, and memory for a single user request.

pub mod advice;
pub mod error;
pub mod input;
pub mod policy;
pub mod secrets;
pub mod swarm;
pub mod template;
pub mod tools;

pub use advice::{AdviceRegistry, AroundAdvice, BeforeAdvice, Continuation, EntrypointFn};
pub use error::SwarmError;
pub use input::parse_selector;
pub use policy::{AllowAll, CommandPolicy, ListPolicy};
pub use secrets::{EnvSecrets, SecretStore};
pub use swarm::{Swarm, SwarmBuilder, UserRequest};
pub use tools::{BuiltinToolOptions, register_builtin_tools};
