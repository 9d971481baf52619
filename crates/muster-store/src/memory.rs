// ABOUTME: The MemoryStore trait: save a batch, load by recency, point lookup by id.
// ABOUTME: VecMemory is the in-process implementation used by tests and ephemeral runs.

use std::sync::Mutex;

use chrono::{Duration, Utc};
use thiserror::Error;

use muster_core::{Message, Role};

/// Errors from the memory store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Filters for a recency load.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Cap on the number of (most recent) messages returned.
    pub max_history: usize,
    /// Only messages created within the last `max_span` minutes.
    pub max_span: i64,
    /// Restrict to these roles when set.
    pub roles: Option<Vec<Role>>,
    /// Restrict to one conversation when set.
    pub chat_id: Option<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            max_history: 100,
            max_span: 14400,
            roles: None,
            chat_id: None,
        }
    }
}

impl LoadOptions {
    pub fn with_roles(mut self, roles: &[Role]) -> Self {
        self.roles = Some(roles.to_vec());
        self
    }

    pub fn with_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    fn matches_role(&self, role: Role) -> bool {
        match &self.roles {
            Some(roles) => roles.contains(&role),
            None => true,
        }
    }

    fn matches_chat(&self, chat_id: &str) -> bool {
        match &self.chat_id {
            Some(id) => id == chat_id,
            None => true,
        }
    }
}

/// A linearisable append-only conversation log. `load` reflects prior `save`
/// calls in the same process once `save` has returned; durability beyond
/// that is the implementation's own contract.
pub trait MemoryStore: Send + Sync {
    /// Atomic batch insert. Messages without a `created` timestamp receive
    /// one on the way in.
    fn save(&self, messages: &[Message]) -> Result<(), StoreError>;

    /// Messages created within the span, ascending by time, capped at the
    /// `max_history` most recent, filtered by roles/chat when given.
    fn load(&self, options: &LoadOptions) -> Result<Vec<Message>, StoreError>;

    /// Point lookup by message id.
    fn get(&self, id: &str) -> Result<Message, StoreError>;
}

/// In-memory store backed by a mutex-guarded vector.
#[derive(Default)]
pub struct VecMemory {
    messages: Mutex<Vec<Message>>,
}

impl VecMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MemoryStore for VecMemory {
    fn save(&self, messages: &[Message]) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut guard = self.messages.lock().unwrap();
        for message in messages {
            let mut message = message.clone();
            if message.created.is_none() {
                message.created = Some(now);
            }
            guard.push(message);
        }
        Ok(())
    }

    fn load(&self, options: &LoadOptions) -> Result<Vec<Message>, StoreError> {
        let cutoff = Utc::now() - Duration::minutes(options.max_span);
        let guard = self.messages.lock().unwrap();

        let mut matched: Vec<Message> = guard
            .iter()
            .filter(|m| m.created.is_some_and(|c| c >= cutoff))
            .filter(|m| options.matches_role(m.role))
            .filter(|m| options.matches_chat(&m.chat_id))
            .cloned()
            .collect();

        matched.sort_by_key(|m| m.created);
        if matched.len() > options.max_history {
            matched.drain(..matched.len() - options.max_history);
        }
        Ok(matched)
    }

    fn get(&self, id: &str) -> Result<Message, StoreError> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("message id: {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_fills_created_and_load_returns_ascending() {
        let store = VecMemory::new();
        let a = Message::user("first");
        let b = Message::assistant("second");
        store.save(&[a.clone(), b.clone()]).unwrap();

        let loaded = store.load(&LoadOptions::default()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded[0].created.is_some());
        assert_eq!(loaded[0].content, "first");
        assert_eq!(loaded[1].content, "second");
    }

    #[test]
    fn load_caps_at_most_recent() {
        let store = VecMemory::new();
        for i in 0..10 {
            let mut msg = Message::user(format!("m{i}"));
            msg.created = Some(Utc::now() - Duration::seconds(100 - i));
            store.save(&[msg]).unwrap();
        }

        let loaded = store
            .load(&LoadOptions {
                max_history: 3,
                ..LoadOptions::default()
            })
            .unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].content, "m7", "keeps the most recent, ascending");
        assert_eq!(loaded[2].content, "m9");
    }

    #[test]
    fn load_filters_by_span_roles_and_chat() {
        let store = VecMemory::new();
        let mut stale = Message::user("stale");
        stale.created = Some(Utc::now() - Duration::minutes(120));
        let fresh = Message::user("fresh").with_chat_id("c1");
        let reply = Message::assistant("reply").with_chat_id("c2");
        store.save(&[stale, fresh, reply]).unwrap();

        let within = store
            .load(&LoadOptions {
                max_span: 60,
                ..LoadOptions::default()
            })
            .unwrap();
        assert_eq!(within.len(), 2);

        let users = store
            .load(&LoadOptions::default().with_roles(&[Role::User]))
            .unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].content, "fresh");

        let c2 = store.load(&LoadOptions::default().with_chat_id("c2")).unwrap();
        assert_eq!(c2.len(), 1);
        assert_eq!(c2[0].content, "reply");
    }

    #[test]
    fn get_finds_by_id_or_errors() {
        let store = VecMemory::new();
        let msg = Message::user("hello");
        let id = msg.id.clone();
        store.save(&[msg]).unwrap();

        assert_eq!(store.get(&id).unwrap().content, "hello");
        assert!(matches!(
            store.get("missing"),
            Err(StoreError::NotFound(_))
        ));
    }
}
