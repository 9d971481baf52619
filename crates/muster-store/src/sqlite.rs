// ABOUTME: SQLite-backed conversation memory: one file, one chats table indexed by created.
// ABOUTME: Batch saves run in a single transaction; loads are recency-windowed range queries.

use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, params};

use muster_core::{Message, Role};

use crate::memory::{LoadOptions, MemoryStore, StoreError};

/// A SQLite-backed conversation store. The table layout is the workbench's
/// persisted-state contract:
/// `chats(id, chat_id, created, content_type, content, role, sender)`.
pub struct SqliteMemory {
    conn: Mutex<Connection>,
}

impl SqliteMemory {
    /// Open or create the store at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// An in-process database, handy for tests that want SQL semantics
    /// without a file.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chats (
                id TEXT PRIMARY KEY,
                chat_id TEXT NOT NULL DEFAULT '',
                created DATETIME NOT NULL,
                content_type TEXT NOT NULL DEFAULT 'text/plain',
                content TEXT NOT NULL DEFAULT '',
                role TEXT NOT NULL,
                sender TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_chats_created ON chats(created);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_chat_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatRow> {
        Ok(ChatRow {
            id: row.get(0)?,
            chat_id: row.get(1)?,
            created: row.get(2)?,
            content_type: row.get(3)?,
            content: row.get(4)?,
            role: row.get(5)?,
            sender: row.get(6)?,
        })
    }
}

/// A raw row from the chats table, before role/timestamp validation.
#[derive(Debug, Clone)]
struct ChatRow {
    id: String,
    chat_id: String,
    created: String,
    content_type: String,
    content: String,
    role: String,
    sender: Option<String>,
}

impl ChatRow {
    fn into_message(self) -> Result<Message, StoreError> {
        let role = Role::from_str(&self.role)
            .map_err(|e| StoreError::Corrupt(format!("bad role {}: {e}", self.role)))?;
        let created = DateTime::parse_from_rfc3339(&self.created)
            .map_err(|e| StoreError::Corrupt(format!("bad timestamp {}: {e}", self.created)))?;

        let mut message = Message::new(role, self.content);
        message.id = self.id;
        message.chat_id = self.chat_id;
        message.content_type = self.content_type;
        message.sender = self.sender;
        message.created = Some(created.with_timezone(&Utc));
        Ok(message)
    }
}

impl MemoryStore for SqliteMemory {
    fn save(&self, messages: &[Message]) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for message in messages {
            let created = message.created.unwrap_or(now);
            tx.execute(
                "INSERT INTO chats (id, chat_id, created, content_type, content, role, sender)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    message.id,
                    message.chat_id,
                    created.to_rfc3339(),
                    message.content_type,
                    message.content,
                    message.role.as_str(),
                    message.sender,
                ],
            )?;
        }
        tx.commit()?;
        tracing::debug!(count = messages.len(), "saved conversation batch");
        Ok(())
    }

    fn load(&self, options: &LoadOptions) -> Result<Vec<Message>, StoreError> {
        let cutoff = (Utc::now() - Duration::minutes(options.max_span)).to_rfc3339();
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, chat_id, created, content_type, content, role, sender
             FROM chats WHERE created >= ?1 ORDER BY created DESC",
        )?;

        let rows = stmt.query_map(params![cutoff], Self::row_to_chat_row)?;

        // Rows arrive most-recent-first; keep the first max_history matches
        // then flip to ascending.
        let mut matched = Vec::new();
        for row in rows {
            let message = row?.into_message()?;
            if let Some(roles) = &options.roles
                && !roles.contains(&message.role)
            {
                continue;
            }
            if let Some(chat_id) = &options.chat_id
                && chat_id != &message.chat_id
            {
                continue;
            }
            matched.push(message);
            if matched.len() >= options.max_history {
                break;
            }
        }
        matched.reverse();
        Ok(matched)
    }

    fn get(&self, id: &str) -> Result<Message, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, chat_id, created, content_type, content, role, sender
             FROM chats WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], Self::row_to_chat_row)?;
        match rows.next() {
            Some(row) => row?.into_message(),
            None => Err(StoreError::NotFound(format!("message id: {id}"))),
        }
    }
}
