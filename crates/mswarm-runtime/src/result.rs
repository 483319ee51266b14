use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use mswarm_core::types::{DataMap, WorkflowKind};

/// Outcome of one workflow step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutcome {
    pub agent: String,
    pub success: bool,
    /// Raw agent result, before transform and filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Values written to the data environment, keyed by output name.
    pub outputs: serde_json::Map<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failure class (`timeout`, `lookup`, `step`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub attempts: u32,
    pub elapsed_ms: u64,
}

impl StepOutcome {
    pub(crate) fn failed(agent: &str, error: &mswarm_core::MswarmError, attempts: u32, elapsed_ms: u64) -> Self {
        Self {
            agent: agent.to_string(),
            success: false,
            result: None,
            outputs: serde_json::Map::new(),
            error: Some(error.to_string()),
            error_kind: Some(error.kind().to_string()),
            attempts,
            elapsed_ms,
        }
    }
}

/// Step outcomes keyed by agent name, in the order steps first reported.
///
/// Serializes as a JSON object. A step whose agent already has an entry
/// replaces it in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepResults(Vec<StepOutcome>);

impl StepResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, outcome: StepOutcome) {
        match self.0.iter_mut().find(|o| o.agent == outcome.agent) {
            Some(existing) => *existing = outcome,
            None => self.0.push(outcome),
        }
    }

    pub fn get(&self, agent: &str) -> Option<&StepOutcome> {
        self.0.iter().find(|o| o.agent == agent)
    }

    pub fn contains(&self, agent: &str) -> bool {
        self.get(agent).is_some()
    }

    /// Agent names in report order.
    pub fn agents(&self) -> Vec<&str> {
        self.0.iter().map(|o| o.agent.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepOutcome> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn all_succeeded(&self) -> bool {
        self.0.iter().all(|o| o.success)
    }
}

impl std::ops::Index<&str> for StepResults {
    type Output = StepOutcome;

    fn index(&self, agent: &str) -> &StepOutcome {
        match self.get(agent) {
            Some(outcome) => outcome,
            None => panic!("no result for agent '{}'", agent),
        }
    }
}

impl Serialize for StepResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for outcome in &self.0 {
            map.serialize_entry(&outcome.agent, outcome)?;
        }
        map.end()
    }
}

/// Record returned by every swarm execution. Step-level failures are
/// reported here, never raised.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub execution_id: String,
    pub swarm: String,
    pub workflow: WorkflowKind,
    pub success: bool,
    /// Step outcomes. For loops, the last iteration's bucket.
    pub results: StepResults,
    /// One bucket per loop iteration.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub iterations: Vec<StepResults>,
    /// Agents skipped by a falsy condition.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
    #[serde(serialize_with = "sorted_map")]
    pub final_data: DataMap,
    pub errors: Vec<String>,
    /// Set when the run was aborted or hit an internal failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl ExecutionResult {
    pub fn to_json(&self) -> mswarm_core::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn sorted_map<S: Serializer>(data: &DataMap, serializer: S) -> Result<S::Ok, S::Error> {
    data.iter().collect::<BTreeMap<_, _>>().serialize(serializer)
}
