// ABOUTME: Conversation memory for muster: an append-only log keyed by chat id.
// ABOUTME: Provides the MemoryStore trait, a SQLite-backed store, and an in-memory store.

pub mod memory;
pub mod sqlite;

pub use memory::{LoadOptions, MemoryStore, StoreError, VecMemory};
pub use sqlite::SqliteMemory;
