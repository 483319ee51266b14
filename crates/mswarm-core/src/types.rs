use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Scalar configuration attached to swarms and agents (`model`, `temperature`, ...).
pub type ConfigMap = BTreeMap<String, serde_json::Value>;

/// The mutable data environment a workflow reads inputs from and writes outputs to.
pub type DataMap = HashMap<String, serde_json::Value>;

/// Derived agent type. Never declared in source; see [`AgentKind::from_capabilities`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Llm,
    Mcp,
    Hybrid,
}

impl AgentKind {
    /// `llm` wins over `mcp`; an agent with neither marker is `hybrid`.
    pub fn from_capabilities(capabilities: &[String]) -> Self {
        if capabilities.iter().any(|c| c == "llm") {
            AgentKind::Llm
        } else if capabilities.iter().any(|c| c == "mcp") {
            AgentKind::Mcp
        } else {
            AgentKind::Hybrid
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Llm => "llm",
            AgentKind::Mcp => "mcp",
            AgentKind::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowKind {
    #[default]
    Sequential,
    Parallel,
    Conditional,
    Loop,
}

impl WorkflowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKind::Sequential => "sequential",
            WorkflowKind::Parallel => "parallel",
            WorkflowKind::Conditional => "conditional",
            WorkflowKind::Loop => "loop",
        }
    }

    pub fn execution_strategy(&self) -> ExecutionStrategy {
        match self {
            WorkflowKind::Sequential => ExecutionStrategy::Linear,
            WorkflowKind::Parallel => ExecutionStrategy::Concurrent,
            WorkflowKind::Conditional => ExecutionStrategy::Branching,
            WorkflowKind::Loop => ExecutionStrategy::Iterative,
        }
    }
}

impl FromStr for WorkflowKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(WorkflowKind::Sequential),
            "parallel" => Ok(WorkflowKind::Parallel),
            "conditional" => Ok(WorkflowKind::Conditional),
            "loop" => Ok(WorkflowKind::Loop),
            other => Err(format!("unknown workflow type: {}", other)),
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStrategy {
    #[default]
    Linear,
    Concurrent,
    Branching,
    Iterative,
}

impl ExecutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStrategy::Linear => "linear",
            ExecutionStrategy::Concurrent => "concurrent",
            ExecutionStrategy::Branching => "branching",
            ExecutionStrategy::Iterative => "iterative",
        }
    }
}

/// What happens after a step has exhausted its attempts and still failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorHandler {
    Retry,
    Skip,
    Abort,
}

impl FromStr for ErrorHandler {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retry" => Ok(ErrorHandler::Retry),
            "skip" => Ok(ErrorHandler::Skip),
            "abort" => Ok(ErrorHandler::Abort),
            other => Err(format!("unknown error handler: {}", other)),
        }
    }
}

/// Context passed to tools during execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Name of the agent invoking the tool.
    pub agent: String,
    /// Base directory for relative paths.
    pub working_dir: PathBuf,
}

impl ToolContext {
    pub fn new(agent: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            agent: agent.into(),
            working_dir: working_dir.into(),
        }
    }
}

/// Python-style truthiness over JSON values: null, false, zero, and empty
/// strings/arrays/objects are falsy.
pub fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
    }
}

/// Render a value the way it is shown to a language model: strings raw, everything else as JSON.
pub fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
