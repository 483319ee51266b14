use tracing::warn;

use mswarm_core::types::{display_value, DataMap};

use crate::result::{StepOutcome, StepResults};

/// Inputs resolved for one step, in the step's declared order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepInputs(Vec<(String, serde_json::Value)>);

impl StepInputs {
    pub fn new(entries: Vec<(String, serde_json::Value)>) -> Self {
        Self(entries)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// `key: value` lines, as handed to a language model.
    pub fn to_prompt(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{}: {}", k, display_value(v)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// JSON object, as handed to a tool.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::Value::Object(self.0.iter().cloned().collect())
    }

    /// Seed data for a nested swarm.
    pub fn to_data(&self) -> DataMap {
        self.0.iter().cloned().collect()
    }
}

/// Mutable state of one swarm execution.
///
/// Created per run and owned by it. Parallel workers never touch it: they
/// read a snapshot of [`data`](Self::data) and hand back their outputs,
/// which [`record`](Self::record) merges one at a time.
#[derive(Debug)]
pub struct ExecutionContext {
    swarm: String,
    data: DataMap,
    pub(crate) results: StepResults,
    pub(crate) iterations: Vec<StepResults>,
    pub(crate) skipped: Vec<String>,
    errors: Vec<String>,
}

impl ExecutionContext {
    pub fn new(swarm: impl Into<String>, data: DataMap) -> Self {
        Self {
            swarm: swarm.into(),
            data,
            results: StepResults::new(),
            iterations: Vec::new(),
            skipped: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn swarm(&self) -> &str {
        &self.swarm
    }

    pub fn data(&self) -> &DataMap {
        &self.data
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.data.insert(key.into(), value);
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Merge a finished step: write its outputs, note a failure, store the outcome.
    pub fn record(&mut self, outcome: StepOutcome) {
        for (key, value) in &outcome.outputs {
            self.data.insert(key.clone(), value.clone());
        }
        if !outcome.success {
            self.errors.push(format!(
                "Agent {} failed: {}",
                outcome.agent,
                outcome.error.as_deref().unwrap_or("unknown error")
            ));
        }
        self.results.insert(outcome);
    }

    pub(crate) fn into_parts(self) -> (DataMap, StepResults, Vec<StepResults>, Vec<String>, Vec<String>) {
        (self.data, self.results, self.iterations, self.skipped, self.errors)
    }
}

/// Look up `names` in `data`. Missing names are logged and left out.
pub fn resolve_inputs(agent: &str, names: &[String], data: &DataMap) -> StepInputs {
    let entries = names
        .iter()
        .filter_map(|name| match data.get(name) {
            Some(value) => Some((name.clone(), value.clone())),
            None => {
                warn!(agent, input = %name, "Input not found in current data");
                None
            }
        })
        .collect();
    StepInputs(entries)
}
