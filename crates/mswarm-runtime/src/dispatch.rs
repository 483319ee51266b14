use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use mswarm_core::error::Result;
use mswarm_core::traits::TextCompletion;
use mswarm_core::types::{AgentKind, ToolContext};
use mswarm_lang::CompiledAgent;
use mswarm_tools::{ToolHandle, ToolRegistry};

use crate::context::StepInputs;

/// Capabilities that only select the agent type and never name a tool.
const TYPE_MARKERS: &[&str] = &["llm", "mcp"];

/// Host-supplied runner for every agent of one derived type. A registered
/// factory takes over from the built-in `llm`/`mcp`/`hybrid` handling; agents
/// whose body is a nested swarm still run that swarm.
pub trait AgentFactory: Send + Sync + 'static {
    fn run<'a>(&'a self, agent: &'a CompiledAgent, inputs: &'a StepInputs) -> BoxFuture<'a, Result<Value>>;
}

type FactoryMap = HashMap<AgentKind, Arc<dyn AgentFactory>>;

/// Runs a single agent against its resolved inputs, by derived agent type.
#[derive(Clone)]
pub struct AgentDispatcher {
    completion: Arc<dyn TextCompletion>,
    tools: Arc<RwLock<ToolRegistry>>,
    factories: Arc<RwLock<FactoryMap>>,
    working_dir: PathBuf,
}

impl AgentDispatcher {
    pub fn new(
        completion: Arc<dyn TextCompletion>,
        tools: Arc<RwLock<ToolRegistry>>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            completion,
            tools,
            factories: Arc::new(RwLock::new(HashMap::new())),
            working_dir: working_dir.into(),
        }
    }

    pub fn tools(&self) -> &Arc<RwLock<ToolRegistry>> {
        &self.tools
    }

    /// Route agents of `kind` to `factory`. Replaces any earlier factory for
    /// the same kind; clones of this dispatcher share the registration.
    pub async fn register_factory(&self, kind: AgentKind, factory: impl AgentFactory) {
        self.factories.write().await.insert(kind, Arc::new(factory));
        debug!(kind = kind.as_str(), "Registered agent factory");
    }

    pub async fn dispatch(&self, agent: &CompiledAgent, inputs: &StepInputs) -> Result<Value> {
        let factory = self.factories.read().await.get(&agent.kind).cloned();
        if let Some(factory) = factory {
            debug!(agent = %agent.name, kind = agent.kind.as_str(), "Dispatching to registered factory");
            return factory.run(agent, inputs).await;
        }

        match agent.kind {
            AgentKind::Llm => self.run_llm(agent, inputs).await,
            AgentKind::Mcp => Ok(self.run_mcp(agent, inputs).await),
            AgentKind::Hybrid => {
                let llm = self.run_llm(agent, inputs).await?;
                let mcp = self.run_mcp(agent, inputs).await;
                Ok(json!({ "llm": llm, "mcp": mcp }))
            }
        }
    }

    async fn run_llm(&self, agent: &CompiledAgent, inputs: &StepInputs) -> Result<Value> {
        let prompt = inputs.to_prompt();
        debug!(agent = %agent.name, completion = self.completion.name(), "Invoking completion");
        let text = self.completion.invoke(prompt).await?;
        Ok(Value::String(text))
    }

    /// Calls every registered capability. Tool failures become `{"error": ...}`
    /// entries rather than step failures.
    async fn run_mcp(&self, agent: &CompiledAgent, inputs: &StepInputs) -> Value {
        // Resolve handles up front so registration is never blocked on a tool run.
        let handles: Vec<(&String, Option<ToolHandle>)> = {
            let registry = self.tools.read().await;
            agent
                .capabilities
                .iter()
                .filter(|c| !TYPE_MARKERS.contains(&c.as_str()))
                .map(|c| (c, registry.handle(c)))
                .collect()
        };

        let mut results = serde_json::Map::new();
        for (capability, handle) in handles {
            let entry = match handle {
                Some(tool) => {
                    let ctx = ToolContext::new(agent.name.clone(), self.working_dir.clone());
                    match tool.call(inputs.to_value(), ctx).await {
                        Ok(value) => value,
                        Err(e) => {
                            error!(agent = %agent.name, tool = %capability, error = %e, "Tool failed");
                            json!({ "error": e.to_string() })
                        }
                    }
                }
                None => {
                    warn!(agent = %agent.name, tool = %capability, "Tool not registered");
                    json!({ "error": "Tool not available" })
                }
            };
            results.insert(capability.clone(), entry);
        }

        Value::Object(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mswarm_test_utils::{FailingTool, StubCompletion, StubTool};

    fn agent(kind: AgentKind, capabilities: &[&str]) -> CompiledAgent {
        CompiledAgent {
            name: "agent".into(),
            role: String::new(),
            capabilities: capabilities.iter().map(|s| s.to_string()).collect(),
            inputs: vec![],
            outputs: vec![],
            config: Default::default(),
            kind,
            swarm: None,
        }
    }

    fn inputs() -> StepInputs {
        StepInputs::new(vec![
            ("query".into(), json!("rust")),
            ("n".into(), json!(3)),
        ])
    }

    async fn dispatcher(stub: StubCompletion) -> AgentDispatcher {
        let mut registry = ToolRegistry::new();
        registry.register(StubTool::new("search", json!({"hits": 2})));
        registry.register(FailingTool::new("broken"));
        AgentDispatcher::new(Arc::new(stub), Arc::new(RwLock::new(registry)), ".")
    }

    #[tokio::test]
    async fn test_llm_agent_gets_formatted_prompt() {
        let stub = StubCompletion::new("answer");
        let d = dispatcher(stub.clone()).await;
        let out = d.dispatch(&agent(AgentKind::Llm, &["llm"]), &inputs()).await.unwrap();
        assert_eq!(out, json!("answer"));
        assert_eq!(stub.prompts(), vec!["query: rust\nn: 3".to_string()]);
    }

    #[tokio::test]
    async fn test_mcp_agent_collects_per_capability() {
        let d = dispatcher(StubCompletion::new("unused")).await;
        let out = d
            .dispatch(
                &agent(AgentKind::Mcp, &["mcp", "search", "broken", "teleport"]),
                &inputs(),
            )
            .await
            .unwrap();
        assert_eq!(out["search"], json!({"hits": 2}));
        assert!(out["broken"]["error"].as_str().unwrap().contains("boom"));
        assert_eq!(out["teleport"], json!({"error": "Tool not available"}));
        assert!(out.get("mcp").is_none());
    }

    #[tokio::test]
    async fn test_hybrid_agent_runs_both() {
        let d = dispatcher(StubCompletion::new("thought")).await;
        let out = d
            .dispatch(&agent(AgentKind::Hybrid, &["search"]), &inputs())
            .await
            .unwrap();
        assert_eq!(out["llm"], json!("thought"));
        assert_eq!(out["mcp"]["search"], json!({"hits": 2}));
    }

    struct Canned(&'static str);

    impl AgentFactory for Canned {
        fn run<'a>(&'a self, agent: &'a CompiledAgent, inputs: &'a StepInputs) -> BoxFuture<'a, Result<Value>> {
            Box::pin(async move { Ok(json!({ "by": self.0, "agent": agent.name, "inputs": inputs.to_value() })) })
        }
    }

    #[tokio::test]
    async fn test_registered_factory_takes_over_its_kind() {
        let stub = StubCompletion::new("model");
        let d = dispatcher(stub.clone()).await;
        d.register_factory(AgentKind::Llm, Canned("custom")).await;

        let out = d.dispatch(&agent(AgentKind::Llm, &["llm"]), &inputs()).await.unwrap();
        assert_eq!(out["by"], json!("custom"));
        assert_eq!(out["inputs"], json!({"query": "rust", "n": 3}));
        assert!(stub.prompts().is_empty());

        // Other kinds keep the built-in handling, and clones share factories.
        let clone = d.clone();
        let out = clone
            .dispatch(&agent(AgentKind::Mcp, &["mcp", "search"]), &inputs())
            .await
            .unwrap();
        assert_eq!(out["search"], json!({"hits": 2}));
        let out = clone.dispatch(&agent(AgentKind::Llm, &["llm"]), &inputs()).await.unwrap();
        assert_eq!(out["by"], json!("custom"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_registration_not_blocked_by_running_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(mswarm_tools::FnTool::new("slow", "Sleeps", |_| async move {
            tokio::time::sleep(std::time::Duration::from_secs(10)).await;
            Ok(json!("done"))
        }));
        let d = AgentDispatcher::new(
            Arc::new(StubCompletion::new("unused")),
            Arc::new(RwLock::new(registry)),
            ".",
        );

        let worker = d.clone();
        let run = tokio::spawn(async move {
            worker
                .dispatch(&agent(AgentKind::Mcp, &["mcp", "slow"]), &inputs())
                .await
        });
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;

        // The tool is still sleeping; a writer must get the lock right away.
        let start = tokio::time::Instant::now();
        d.tools().write().await.register(StubTool::new("late", json!(1)));
        assert_eq!(start.elapsed(), std::time::Duration::ZERO);
        assert!(!run.is_finished());

        let out = run.await.unwrap().unwrap();
        assert_eq!(out["slow"], json!("done"));
    }
}
