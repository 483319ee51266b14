use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::ToolContext;

/// Single-turn text completion: the executor's only call into a language model.
pub trait TextCompletion: Send + Sync + 'static {
    /// Complete `prompt` and return the model's text.
    fn invoke(&self, prompt: String) -> BoxFuture<'_, Result<String>>;

    /// Identifier for logs (provider/model).
    fn name(&self) -> &str {
        "completion"
    }
}

/// A named capability an `mcp` agent can call.
pub trait Tool: Send + Sync + 'static {
    /// Capability name (matched against agent capabilities).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Execute the tool with the agent's resolved inputs.
    fn execute(
        &self,
        inputs: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>>;

    /// Timeout in seconds for this tool.
    fn timeout_secs(&self) -> u64 {
        30
    }
}
