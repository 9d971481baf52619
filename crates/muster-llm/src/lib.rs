// ABOUTME: Provider-agnostic LLM adapter layer for muster.
// ABOUTME: Defines the Adapter trait, the adapter registry, and the per-provider exchanges.

pub mod adapter;
pub mod api;
pub mod providers;
pub mod testing;
pub mod turns;

pub use adapter::{AdapterRegistry, ChatDispatchAdapter, EchoAdapter, ImageGenAdapter};
pub use api::{Adapter, AdapterError, ChatRequest, ChatResponse};
pub use turns::{ProviderExchange, ProviderTurn, encode_tool_feedback, run_turns};
