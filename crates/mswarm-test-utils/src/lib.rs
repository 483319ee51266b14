//! Stub capabilities and fixtures shared by mswarm tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;

use mswarm_core::config::ExecutorConfig;
use mswarm_core::error::{MswarmError, Result};
use mswarm_core::traits::{TextCompletion, Tool};
use mswarm_core::types::ToolContext;

// ── Completions ─────────────────────────────────────────────────

/// Answers every prompt with the same text and records the prompts it saw.
#[derive(Clone)]
pub struct StubCompletion {
    reply: String,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl StubCompletion {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or_default()
    }
}

impl TextCompletion for StubCompletion {
    fn invoke(&self, prompt: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(prompt);
            }
            Ok(self.reply.clone())
        })
    }

    fn name(&self) -> &str {
        "stub"
    }
}

/// Plays back a script of replies in order; errors once the script runs out.
#[derive(Clone)]
pub struct ScriptedCompletion {
    script: Arc<Mutex<VecDeque<Result<String>>>>,
}

impl ScriptedCompletion {
    pub fn new(script: Vec<Result<String>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
        }
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or_default()
    }
}

impl TextCompletion for ScriptedCompletion {
    fn invoke(&self, _prompt: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            self.script
                .lock()
                .ok()
                .and_then(|mut s| s.pop_front())
                .unwrap_or_else(|| Err(MswarmError::LlmRequest("script exhausted".into())))
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Always fails with `LlmRequest(message)`.
pub struct FailingCompletion {
    message: String,
}

impl FailingCompletion {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl TextCompletion for FailingCompletion {
    fn invoke(&self, _prompt: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move { Err(MswarmError::LlmRequest(self.message.clone())) })
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Sleeps before answering. Pair with a paused tokio clock.
pub struct SlowCompletion {
    delay: Duration,
    reply: String,
}

impl SlowCompletion {
    pub fn new(delay: Duration, reply: impl Into<String>) -> Self {
        Self {
            delay,
            reply: reply.into(),
        }
    }
}

impl TextCompletion for SlowCompletion {
    fn invoke(&self, _prompt: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            Ok(self.reply.clone())
        })
    }

    fn name(&self) -> &str {
        "slow"
    }
}

// ── Tools ───────────────────────────────────────────────────────

/// Returns a fixed value and records the inputs of every call.
#[derive(Clone)]
pub struct StubTool {
    name: String,
    output: Value,
    calls: Arc<Mutex<Vec<Value>>>,
}

impl StubTool {
    pub fn new(name: impl Into<String>, output: Value) -> Self {
        Self {
            name: name.into(),
            output,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Tool for StubTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "stub tool"
    }

    fn execute(&self, inputs: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(inputs);
            }
            Ok(self.output.clone())
        })
    }
}

/// Always fails with `ToolExecution`.
pub struct FailingTool {
    name: String,
}

impl FailingTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "always fails"
    }

    fn execute(&self, _inputs: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            Err(MswarmError::ToolExecution {
                tool: self.name.clone(),
                message: "boom".into(),
            })
        })
    }
}

// ── Fixtures ────────────────────────────────────────────────────

/// Executor settings with no backoff delay, for fast retry tests.
pub fn fast_executor_config() -> ExecutorConfig {
    ExecutorConfig {
        retry_backoff_ms: 0,
        max_backoff_ms: 0,
        ..Default::default()
    }
}

/// One `llm` agent `a` reading `x` and writing `y`, run sequentially.
pub const SINGLE_LLM_AGENT: &str = r#"
swarm s {
    agent a {
        role: "Answerer"
        capabilities: "llm"
        inputs: "x"
        outputs: "y"
    }

    workflow sequential {
        a(input: "x", output: "y")
    }
}
"#;
