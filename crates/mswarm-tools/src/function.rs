use std::future::Future;

use futures::future::BoxFuture;

use mswarm_core::error::Result;
use mswarm_core::traits::Tool;
use mswarm_core::types::ToolContext;

/// Adapts an async closure `inputs -> Result<Value>` into a [`Tool`].
///
/// ```ignore
/// registry.register(FnTool::new("lookup", "Look a key up", |inputs| async move {
///     Ok(serde_json::json!({ "found": inputs["key"] }))
/// }));
/// ```
pub struct FnTool<F> {
    name: String,
    description: String,
    timeout_secs: u64,
    func: F,
}

impl<F, Fut> FnTool<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
{
    pub fn new(name: impl Into<String>, description: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            timeout_secs: 30,
            func,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

impl<F, Fut> Tool for FnTool<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn execute(
        &self,
        inputs: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin((self.func)(inputs))
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }
}
