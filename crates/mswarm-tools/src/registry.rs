use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use mswarm_core::config::ToolsConfig;
use mswarm_core::error::{MswarmError, Result};
use mswarm_core::traits::Tool;
use mswarm_core::types::ToolContext;

/// Registry of capabilities an `mcp` agent can call, keyed by capability name.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Upper bound on any single call, whatever the tool asks for.
    timeout_cap: Option<Duration>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            timeout_cap: None,
        }
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register(&mut self, tool: impl Tool) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        debug!(tool = %name, "Registered tool");
        self.tools.insert(name, tool);
    }

    /// Unregister a tool by name.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn set_timeout_cap(&mut self, secs: u64) {
        self.timeout_cap = Some(Duration::from_secs(secs));
    }

    /// A detached handle to `name` carrying its capped timeout, for calls made
    /// after any lock around the registry has been released.
    pub fn handle(&self, name: &str) -> Option<ToolHandle> {
        let tool = self.get(name)?;
        let mut timeout = Duration::from_secs(tool.timeout_secs());
        if let Some(cap) = self.timeout_cap {
            timeout = timeout.min(cap);
        }
        Some(ToolHandle { tool, timeout })
    }

    /// Execute a tool by name under its timeout.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<serde_json::Value> {
        self.handle(name)
            .ok_or_else(|| MswarmError::ToolNotFound(name.to_string()))?
            .call(input, ctx)
            .await
    }

    /// Create a registry with the built-in tools enabled by `config`.
    pub fn with_builtins(config: &ToolsConfig) -> Self {
        let mut registry = Self::new();
        registry.set_timeout_cap(config.timeout_secs);
        if !config.builtin {
            return registry;
        }

        // ── Files ───────────────────────────────────────────────
        registry.register(crate::builtin::read_file::ReadFileTool);
        registry.register(crate::builtin::list_dir::ListDirTool);
        registry.register(crate::builtin::file_search::FileSearchTool);
        registry.register(crate::builtin::grep_search::GrepSearchTool);

        // ── Shell ───────────────────────────────────────────────
        if config.allow_terminal {
            registry.register(crate::builtin::run_terminal::RunTerminalTool);
        }

        registry
    }
}

/// A registered tool resolved out of its registry.
#[derive(Clone)]
pub struct ToolHandle {
    tool: Arc<dyn Tool>,
    timeout: Duration,
}

impl ToolHandle {
    pub fn name(&self) -> &str {
        self.tool.name()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn call(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<serde_json::Value> {
        match tokio::time::timeout(self.timeout, self.tool.execute(input, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(MswarmError::ToolTimeout {
                tool: self.tool.name().to_string(),
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.list())
            .field("timeout_cap", &self.timeout_cap)
            .finish()
    }
}
