// ABOUTME: Builtin tool handlers registered into the core tool registry.
// ABOUTME: Shell and git are policy-gated; fs is workspace-rooted; flow tools drive transfer/exit.

pub mod db;
pub mod flow;
pub mod fs;
pub mod git;
pub mod shell;
pub mod web;

use std::path::PathBuf;
use std::sync::Arc;

use muster_core::{CoreError, ToolRegistry};

use crate::policy::CommandPolicy;

/// Wiring for the builtin tool set.
pub struct BuiltinToolOptions {
    pub policy: Arc<dyn CommandPolicy>,
    pub workspace: PathBuf,
    pub db_path: Option<PathBuf>,
}

impl BuiltinToolOptions {
    pub fn new(policy: Arc<dyn CommandPolicy>) -> Self {
        Self {
            policy,
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            db_path: None,
        }
    }

    pub fn with_workspace(mut self, workspace: PathBuf) -> Self {
        self.workspace = workspace;
        self
    }

    pub fn with_db(mut self, db_path: PathBuf) -> Self {
        self.db_path = Some(db_path);
        self
    }
}

/// Register the whole builtin tool set: shell, git, web, filesystem, flow,
/// and (when a database is wired) the query tool.
pub fn register_builtin_tools(
    registry: &mut ToolRegistry,
    options: &BuiltinToolOptions,
) -> Result<(), CoreError> {
    shell::register_shell_tools(registry, Arc::clone(&options.policy))?;
    git::register_git_tools(registry, Arc::clone(&options.policy))?;
    web::register_web_tools(registry)?;
    fs::register_fs_tools(registry, options.workspace.clone())?;
    flow::register_flow_tools(registry)?;
    if let Some(db_path) = &options.db_path {
        db::register_db_tools(registry, db_path.clone())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::AllowAll;

    #[test]
    fn builtin_set_registers_expected_names() {
        let mut registry = ToolRegistry::new();
        let options = BuiltinToolOptions::new(Arc::new(AllowAll))
            .with_db(PathBuf::from("/tmp/unused.db"));
        register_builtin_tools(&mut registry, &options).unwrap();

        for name in [
            "sh.exec",
            "git.status",
            "git.diff",
            "git.log",
            "web.search",
            "web.fetch",
            "fs.read",
            "fs.write",
            "fs.list",
            "agent.transfer",
            "agent.exit",
            "db.query",
        ] {
            assert!(registry.contains(name), "missing builtin tool {name}");
        }
    }

    #[test]
    fn db_tool_is_optional() {
        let mut registry = ToolRegistry::new();
        let options = BuiltinToolOptions::new(Arc::new(AllowAll));
        register_builtin_tools(&mut registry, &options).unwrap();
        assert!(!registry.contains("db.query"));
    }
}
