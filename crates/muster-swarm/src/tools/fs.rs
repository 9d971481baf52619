// ABOUTME: Workspace-rooted filesystem tools: read, write, and list.
// ABOUTME: Paths resolve inside the workspace; escapes and absolute paths are rejected.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use muster_core::{
    Arguments, CoreError, JsonMap, Outcome, ToolHandler, ToolRegistry, ToolSpec,
};

use crate::tools::shell::clip;

const MAX_READ: usize = 100_000;

/// Resolve a relative path inside the workspace root. `..` components may
/// not climb out; absolute paths are rejected outright.
pub(crate) fn resolve(root: &Path, path: &str) -> anyhow::Result<PathBuf> {
    let mut resolved = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    anyhow::bail!("path escapes the workspace: {path}");
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                anyhow::bail!("absolute paths are not allowed: {path}");
            }
        }
    }
    Ok(root.join(resolved))
}

pub fn register_fs_tools(registry: &mut ToolRegistry, root: PathBuf) -> Result<(), CoreError> {
    let read_root = root.clone();
    let read: Arc<dyn ToolHandler> = Arc::new(
        move |_cancel: CancellationToken, args: JsonMap| -> BoxFuture<'static, anyhow::Result<Outcome>> {
            let root = read_root.clone();
            Box::pin(async move {
                let view = Arguments::new(&args);
                let Some(path) = view.str("path") else {
                    return Ok(Outcome::text("missing required argument: path"));
                };
                let full = resolve(&root, path)?;
                let content = tokio::fs::read_to_string(&full).await?;
                Ok(Outcome::text(clip(&content, MAX_READ)))
            })
        },
    );
    registry.register(
        ToolSpec::new(
            "fs.read",
            "Read a text file from the workspace.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Workspace-relative file path."}
                },
                "required": ["path"]
            }),
        ),
        read,
    )?;

    let write_root = root.clone();
    let write: Arc<dyn ToolHandler> = Arc::new(
        move |_cancel: CancellationToken, args: JsonMap| -> BoxFuture<'static, anyhow::Result<Outcome>> {
            let root = write_root.clone();
            Box::pin(async move {
                let view = Arguments::new(&args);
                let Some(path) = view.str("path") else {
                    return Ok(Outcome::text("missing required argument: path"));
                };
                let content = view.string_or("content", "");
                let full = resolve(&root, path)?;
                if let Some(parent) = full.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&full, content.as_bytes()).await?;
                Ok(Outcome::text(format!(
                    "wrote {} bytes to {path}",
                    content.len()
                )))
            })
        },
    );
    registry.register(
        ToolSpec::new(
            "fs.write",
            "Write a text file into the workspace, creating parent directories.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Workspace-relative file path."},
                    "content": {"type": "string", "description": "The file content."}
                },
                "required": ["path", "content"]
            }),
        ),
        write,
    )?;

    let list: Arc<dyn ToolHandler> = Arc::new(
        move |_cancel: CancellationToken, args: JsonMap| -> BoxFuture<'static, anyhow::Result<Outcome>> {
            let root = root.clone();
            Box::pin(async move {
                let view = Arguments::new(&args);
                let path = view.string_or("path", ".");
                let full = resolve(&root, &path)?;

                let mut entries = tokio::fs::read_dir(&full).await?;
                let mut names = Vec::new();
                while let Some(entry) = entries.next_entry().await? {
                    let mut name = entry.file_name().to_string_lossy().into_owned();
                    if entry.file_type().await?.is_dir() {
                        name.push('/');
                    }
                    names.push(name);
                }
                names.sort();
                Ok(Outcome::text(names.join("\n")))
            })
        },
    );
    registry.register(
        ToolSpec::new(
            "fs.list",
            "List a workspace directory; directories carry a trailing slash.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Workspace-relative directory, default '.'."}
                },
                "required": []
            }),
        ),
        list,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(value: serde_json::Value) -> JsonMap {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn resolve_keeps_paths_inside_the_root() {
        let root = Path::new("/workspace");
        assert_eq!(
            resolve(root, "src/main.rs").unwrap(),
            PathBuf::from("/workspace/src/main.rs")
        );
        assert_eq!(
            resolve(root, "a/./b/../c").unwrap(),
            PathBuf::from("/workspace/a/c")
        );
        assert!(resolve(root, "../escape").is_err());
        assert!(resolve(root, "/etc/passwd").is_err());
    }

    #[tokio::test]
    async fn write_read_list_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut registry = ToolRegistry::new();
        register_fs_tools(&mut registry, dir.path().to_path_buf()).unwrap();
        let cancel = CancellationToken::new();

        let out = registry
            .run(
                &cancel,
                "fs.write",
                &args(serde_json::json!({"path": "notes/todo.txt", "content": "ship it"})),
            )
            .await
            .unwrap();
        assert!(out.value.contains("wrote 7 bytes"));

        let out = registry
            .run(
                &cancel,
                "fs.read",
                &args(serde_json::json!({"path": "notes/todo.txt"})),
            )
            .await
            .unwrap();
        assert_eq!(out.value, "ship it");

        let out = registry
            .run(&cancel, "fs.list", &args(serde_json::json!({"path": "."})))
            .await
            .unwrap();
        assert_eq!(out.value, "notes/");

        let out = registry
            .run(&cancel, "fs.list", &args(serde_json::json!({"path": "notes"})))
            .await
            .unwrap();
        assert_eq!(out.value, "todo.txt");
    }

    #[tokio::test]
    async fn escaping_paths_fold_into_error_results() {
        let dir = TempDir::new().unwrap();
        let mut registry = ToolRegistry::new();
        register_fs_tools(&mut registry, dir.path().to_path_buf()).unwrap();
        let cancel = CancellationToken::new();

        let out = registry
            .run(
                &cancel,
                "fs.read",
                &args(serde_json::json!({"path": "../../etc/passwd"})),
            )
            .await
            .unwrap();
        assert!(out.is_continue());
        assert!(out.value.contains("escapes the workspace"));
    }

    #[tokio::test]
    async fn missing_file_reports_as_error_result() {
        let dir = TempDir::new().unwrap();
        let mut registry = ToolRegistry::new();
        register_fs_tools(&mut registry, dir.path().to_path_buf()).unwrap();
        let cancel = CancellationToken::new();

        let out = registry
            .run(&cancel, "fs.read", &args(serde_json::json!({"path": "nope.txt"})))
            .await
            .unwrap();
        assert!(out.is_continue());
        assert!(!out.value.is_empty());
    }
}
