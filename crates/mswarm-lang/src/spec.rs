//! Compiled swarm specification.
//!
//! This is the executable form of an M program and its JSON serialization is
//! the wire format other tooling reads. A compiled swarm is immutable and may
//! be executed any number of times with different initial data.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use mswarm_core::error::Result;
use mswarm_core::types::{AgentKind, ConfigMap, ErrorHandler, ExecutionStrategy, WorkflowKind};

/// Tag written as `"type": "swarm"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecKind {
    #[default]
    Swarm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledSwarm {
    #[serde(rename = "type", default)]
    pub kind: SpecKind,
    pub name: String,
    /// Agent registry keyed by agent name.
    pub agents: BTreeMap<String, CompiledAgent>,
    pub workflow: CompiledWorkflow,
    #[serde(default)]
    pub config: ConfigMap,
    pub execution_plan: ExecutionPlan,
}

impl CompiledSwarm {
    pub fn agent(&self, name: &str) -> Option<&CompiledAgent> {
        self.agents.get(name)
    }

    /// Step agent names that have no entry in the registry.
    pub fn undeclared_agents(&self) -> Vec<&str> {
        self.workflow
            .steps
            .iter()
            .map(|s| s.agent.as_str())
            .filter(|name| !self.agents.contains_key(*name))
            .collect()
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledAgent {
    pub name: String,
    pub role: String,
    pub capabilities: Vec<String>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    #[serde(default)]
    pub config: ConfigMap,
    #[serde(rename = "type")]
    pub kind: AgentKind,
    /// Compiled nested swarm when the agent is itself a swarm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swarm: Option<Box<CompiledSwarm>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledWorkflow {
    #[serde(rename = "type")]
    pub kind: WorkflowKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub steps: Vec<CompiledStep>,
    #[serde(default)]
    pub conditions: Option<Vec<String>>,
    #[serde(default)]
    pub max_iterations: Option<u32>,
    pub execution_strategy: ExecutionStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledStep {
    pub agent: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    #[serde(default)]
    pub transform: Option<String>,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub retry: Option<u32>,
    #[serde(default)]
    pub error_handler: Option<ErrorHandler>,
    /// Agents of earlier steps whose outputs this step consumes.
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub execution_strategy: ExecutionStrategy,
}

impl CompiledStep {
    pub fn is_independent(&self) -> bool {
        self.dependencies.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub phases: Vec<Phase>,
    /// Agent name to prerequisite agent names.
    pub dependencies: BTreeMap<String, Vec<String>>,
    pub data_flow: BTreeMap<String, DataFlow>,
    pub error_handling: BTreeMap<String, ErrorHandler>,
    #[serde(default)]
    pub monitoring: Monitoring,
}

/// Per-step limits a run is watched against. Steps without an explicit
/// `timeout:` or `retry:` are absent, so an unconstrained plan serializes
/// this section as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Monitoring {
    /// Agent name to per-attempt deadline in seconds.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub timeouts: BTreeMap<String, u64>,
    /// Agent name to extra attempts after a failure.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub retries: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub phase_id: usize,
    pub step_id: usize,
    pub agent: String,
    pub dependencies: Vec<String>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub execution_type: WorkflowKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFlow {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub transform: Option<String>,
    pub filter: Option<String>,
}
