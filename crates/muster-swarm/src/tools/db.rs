// ABOUTME: Read-only SQLite query tool: SELECT-only guard, rows back as JSON.
// ABOUTME: The connection opens per call on a blocking task; results are row-capped.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use rusqlite::Connection;
use rusqlite::types::ValueRef;
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;

use muster_core::{
    Arguments, CoreError, JsonMap, Outcome, ToolHandler, ToolRegistry, ToolSpec,
};

const MAX_ROWS: usize = 100;

/// True for statements the query tool will run: reads only.
pub(crate) fn is_read_only(sql: &str) -> bool {
    let head = sql.trim_start().to_ascii_lowercase();
    head.starts_with("select") || head.starts_with("with") || head.starts_with("pragma table_info")
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => json!(i),
        ValueRef::Real(f) => json!(f),
        ValueRef::Text(t) => json!(String::from_utf8_lossy(t)),
        ValueRef::Blob(b) => json!(format!("<blob {} bytes>", b.len())),
    }
}

fn run_query(path: &PathBuf, sql: &str) -> anyhow::Result<String> {
    let conn = Connection::open(path)?;
    let mut stmt = conn.prepare(sql)?;
    let column_names: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut object = Map::new();
        for (i, name) in column_names.iter().enumerate() {
            object.insert(name.clone(), value_to_json(row.get_ref(i)?));
        }
        out.push(Value::Object(object));
        if out.len() >= MAX_ROWS {
            break;
        }
    }
    Ok(Value::Array(out).to_string())
}

pub fn register_db_tools(registry: &mut ToolRegistry, db_path: PathBuf) -> Result<(), CoreError> {
    let handler: Arc<dyn ToolHandler> = Arc::new(
        move |cancel: CancellationToken, args: JsonMap| -> BoxFuture<'static, anyhow::Result<Outcome>> {
            let db_path = db_path.clone();
            Box::pin(async move {
                let view = Arguments::new(&args);
                let Some(sql) = view.str("sql") else {
                    return Ok(Outcome::text("missing required argument: sql"));
                };
                if !is_read_only(sql) {
                    return Ok(Outcome::text("denied: only read-only queries are allowed"));
                }

                let sql = sql.to_string();
                let task = tokio::task::spawn_blocking(move || run_query(&db_path, &sql));
                let rows = tokio::select! {
                    _ = cancel.cancelled() => anyhow::bail!("query cancelled"),
                    joined = task => joined??,
                };
                Ok(Outcome::with_mime(rows, "application/json"))
            })
        },
    );

    registry.register(
        ToolSpec::new(
            "db.query",
            "Run a read-only SQL query against the workbench database; rows return as JSON.",
            json!({
                "type": "object",
                "properties": {
                    "sql": {"type": "string", "description": "A SELECT statement."}
                },
                "required": ["sql"]
            }),
        ),
        handler,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seeded_db(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("data.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER, name TEXT);
             INSERT INTO users VALUES (1, 'ada'), (2, 'grace');",
        )
        .unwrap();
        path
    }

    fn args(value: serde_json::Value) -> JsonMap {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn read_only_guard() {
        assert!(is_read_only("SELECT * FROM users"));
        assert!(is_read_only("  with t as (select 1) select * from t"));
        assert!(!is_read_only("INSERT INTO users VALUES (3, 'x')"));
        assert!(!is_read_only("DROP TABLE users"));
    }

    #[tokio::test]
    async fn query_returns_rows_as_json() {
        let dir = TempDir::new().unwrap();
        let path = seeded_db(&dir);

        let mut registry = ToolRegistry::new();
        register_db_tools(&mut registry, path).unwrap();
        let cancel = CancellationToken::new();

        let out = registry
            .run(
                &cancel,
                "db.query",
                &args(json!({"sql": "SELECT id, name FROM users ORDER BY id"})),
            )
            .await
            .unwrap();

        assert_eq!(out.mime_type, "application/json");
        let rows: Value = serde_json::from_str(&out.value).unwrap();
        assert_eq!(rows[0]["name"], "ada");
        assert_eq!(rows[1]["id"], 2);
    }

    #[tokio::test]
    async fn writes_are_denied() {
        let dir = TempDir::new().unwrap();
        let path = seeded_db(&dir);

        let mut registry = ToolRegistry::new();
        register_db_tools(&mut registry, path).unwrap();
        let cancel = CancellationToken::new();

        let out = registry
            .run(
                &cancel,
                "db.query",
                &args(json!({"sql": "DELETE FROM users"})),
            )
            .await
            .unwrap();
        assert!(out.value.starts_with("denied:"));
    }
}
