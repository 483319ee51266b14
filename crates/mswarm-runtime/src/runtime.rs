use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use mswarm_core::config::AppConfig;
use mswarm_core::error::{MswarmError, Result};
use mswarm_core::traits::{TextCompletion, Tool};
use mswarm_core::types::{AgentKind, DataMap, ExecutionStrategy, WorkflowKind};
use mswarm_lang::{parse, tokenize, Compiler, CompiledSwarm, Token};
use mswarm_tools::ToolRegistry;

use crate::authoring;
use crate::dispatch::{AgentDispatcher, AgentFactory};
use crate::executor::Executor;
use crate::result::ExecutionResult;

/// Outcome of a pre-flight check. Never raised as an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Validation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agents_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_type: Option<WorkflowKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Validation {
    fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            tokens_count: None,
            agents_count: None,
            workflow_type: None,
            steps_count: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwarmSummary {
    pub name: String,
    pub total_agents: usize,
    /// Agent count per derived type.
    pub agent_types: BTreeMap<String, usize>,
    pub workflow_type: WorkflowKind,
    pub steps_count: usize,
    pub execution_strategy: ExecutionStrategy,
    pub description: String,
}

/// Model-authored source, the swarm it compiled to, and how the run went.
#[derive(Debug, Clone, Serialize)]
pub struct Orchestration {
    pub source: String,
    pub spec: CompiledSwarm,
    pub result: ExecutionResult,
}

/// The front door: source text in, execution results out.
///
/// Owns the tool registry, the text-completion capability and the executor
/// built from them. Hosts register extra tools with
/// [`register_tool`](Self::register_tool) before running swarms that need them.
pub struct MRuntime {
    config: AppConfig,
    completion: Arc<dyn TextCompletion>,
    tools: Arc<RwLock<ToolRegistry>>,
    executor: Executor,
    compiler: Mutex<Compiler>,
}

impl MRuntime {
    /// Runtime with the built-in tools enabled in `config.tools`.
    pub fn new(config: AppConfig, completion: Arc<dyn TextCompletion>) -> Self {
        let tools = ToolRegistry::with_builtins(&config.tools);
        Self::with_tools(config, completion, tools)
    }

    pub fn with_tools(config: AppConfig, completion: Arc<dyn TextCompletion>, tools: ToolRegistry) -> Self {
        let tools = Arc::new(RwLock::new(tools));
        let dispatcher = AgentDispatcher::new(completion.clone(), tools.clone(), config.workspace_dir());
        let executor = Executor::new(dispatcher, config.executor.clone());
        Self {
            config,
            completion,
            tools,
            executor,
            compiler: Mutex::new(Compiler::new()),
        }
    }

    /// Runtime whose completion client is built from `config.llm`.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let completion = mswarm_llm::create_completion(&config.llm)?;
        Ok(Self::new(config, completion))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn tools(&self) -> &Arc<RwLock<ToolRegistry>> {
        &self.tools
    }

    pub async fn register_tool(&self, tool: impl Tool) {
        let name = tool.name().to_string();
        self.tools.write().await.register(tool);
        info!(tool = %name, "Registered tool");
    }

    /// Hand every agent of `kind` to `factory`, for hosts that bring their
    /// own agent implementations.
    pub async fn register_agent_factory(&self, kind: AgentKind, factory: impl AgentFactory) {
        self.executor.register_agent_factory(kind, factory).await;
        info!(kind = kind.as_str(), "Registered agent factory");
    }

    pub fn tokenize(&self, source: &str) -> Result<Vec<Token>> {
        tokenize(source)
    }

    pub fn parse_and_compile(&self, source: &str) -> Result<CompiledSwarm> {
        let tokens = tokenize(source)?;
        let ast = parse(&tokens)?;
        debug!(tokens = tokens.len(), swarms = ast.swarms().len(), "Parsed source");

        let mut compiler = self.compiler.lock().unwrap_or_else(|e| e.into_inner());
        compiler.compile(&ast).map_err(|e| {
            error!(error = %e, "Parse/compile failed");
            e
        })
    }

    /// A previously compiled top-level swarm, by name.
    pub fn compiled(&self, name: &str) -> Option<CompiledSwarm> {
        let compiler = self.compiler.lock().unwrap_or_else(|e| e.into_inner());
        compiler.compiled(name).cloned()
    }

    /// Tokenize, parse and compile without executing. Step references to
    /// undeclared agents fail validation at every nesting level.
    pub fn validate(&self, source: &str) -> Validation {
        let tokens = match tokenize(source) {
            Ok(tokens) => tokens,
            Err(e) => return Validation::invalid(e.to_string()),
        };
        let spec = match parse(&tokens).and_then(|ast| mswarm_lang::compile(&ast)) {
            Ok(spec) => spec,
            Err(e) => return Validation::invalid(e.to_string()),
        };
        if let Some((swarm, agent)) = first_undeclared(&spec) {
            return Validation::invalid(format!(
                "Step references undeclared agent '{}' in swarm '{}'",
                agent, swarm
            ));
        }

        Validation {
            valid: true,
            tokens_count: Some(tokens.len()),
            agents_count: Some(spec.agents.len()),
            workflow_type: Some(spec.workflow.kind),
            steps_count: Some(spec.workflow.steps.len()),
            error: None,
        }
    }

    pub async fn execute_swarm(&self, spec: &CompiledSwarm, initial_data: DataMap) -> ExecutionResult {
        self.executor.execute_swarm(spec, initial_data).await
    }

    /// Compile and run `source`. Front-end failures are returned as errors;
    /// execution problems are reported inside the result.
    pub async fn execute_source(&self, source: &str, initial_data: DataMap) -> Result<ExecutionResult> {
        let spec = self.parse_and_compile(source)?;
        Ok(self.execute_swarm(&spec, initial_data).await)
    }

    /// Run model-authored `source` with `user_command` as the only initial data.
    pub async fn process_llm_request(&self, source: &str, user_command: &str) -> Result<ExecutionResult> {
        let mut data = DataMap::new();
        data.insert("user_command".into(), serde_json::Value::String(user_command.to_string()));
        self.execute_source(authoring::strip_code_fences(source), data).await
    }

    /// Ask the completion capability to design a swarm for `user_command`,
    /// then run it.
    pub async fn orchestrate(&self, user_command: &str) -> Result<Orchestration> {
        info!(command = %user_command, completion = self.completion.name(), "Orchestrating");
        let reply = self
            .completion
            .invoke(authoring::architect_prompt(user_command))
            .await?;
        let source = authoring::strip_code_fences(&reply).to_string();
        debug!(chars = source.len(), "Received swarm source");

        let spec = self.parse_and_compile(&source)?;
        if let Some((swarm, agent)) = first_undeclared(&spec) {
            return Err(MswarmError::Compilation(format!(
                "Step references undeclared agent '{}' in swarm '{}'",
                agent, swarm
            )));
        }

        let mut data = DataMap::new();
        data.insert("user_command".into(), serde_json::Value::String(user_command.to_string()));
        let result = self.execute_swarm(&spec, data).await;
        Ok(Orchestration { source, spec, result })
    }

    pub fn template(&self, task: &str) -> String {
        authoring::template(task)
    }

    pub fn language_guide(&self) -> &'static str {
        authoring::LANGUAGE_GUIDE
    }

    pub fn to_json(&self, spec: &CompiledSwarm) -> Result<String> {
        spec.to_json()
    }

    pub fn summarize(&self, spec: &CompiledSwarm) -> SwarmSummary {
        let mut agent_types = BTreeMap::new();
        for agent in spec.agents.values() {
            *agent_types.entry(agent.kind.to_string()).or_insert(0) += 1;
        }
        SwarmSummary {
            name: spec.name.clone(),
            total_agents: spec.agents.len(),
            agent_types,
            workflow_type: spec.workflow.kind,
            steps_count: spec.workflow.steps.len(),
            execution_strategy: spec.workflow.execution_strategy,
            description: format!(
                "Swarm '{}' with {} agents and {} workflow",
                spec.name,
                spec.agents.len(),
                spec.workflow.kind
            ),
        }
    }
}

/// `(swarm, agent)` for the first step naming an agent its swarm lacks.
fn first_undeclared(spec: &CompiledSwarm) -> Option<(String, String)> {
    if let Some(agent) = spec.undeclared_agents().first() {
        return Some((spec.name.clone(), agent.to_string()));
    }
    spec.agents
        .values()
        .filter_map(|agent| agent.swarm.as_deref())
        .find_map(first_undeclared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mswarm_core::config::ToolsConfig;
    use mswarm_test_utils::{fast_executor_config, ScriptedCompletion, StubCompletion, StubTool, SINGLE_LLM_AGENT};
    use serde_json::json;

    fn runtime(completion: impl TextCompletion) -> MRuntime {
        let config = AppConfig {
            executor: fast_executor_config(),
            tools: ToolsConfig {
                builtin: false,
                ..Default::default()
            },
            ..Default::default()
        };
        MRuntime::new(config, Arc::new(completion))
    }

    #[tokio::test]
    async fn test_concrete_scenario() {
        let rt = runtime(StubCompletion::new("stubbed"));
        let mut data = DataMap::new();
        data.insert("x".into(), json!("hi"));

        let result = rt.execute_source(SINGLE_LLM_AGENT, data).await.unwrap();
        assert!(result.success);
        assert!(result.results["a"].success);
        assert_eq!(result.final_data.len(), 2);
        assert_eq!(result.final_data["x"], json!("hi"));
        assert_eq!(result.final_data["y"], json!("stubbed"));
        assert!(rt.compiled("s").is_some());
    }

    #[test]
    fn test_validate_accepts_valid_source() {
        let v = runtime(StubCompletion::new("")).validate(SINGLE_LLM_AGENT);
        assert!(v.valid);
        assert_eq!(v.agents_count, Some(1));
        assert_eq!(v.steps_count, Some(1));
        assert_eq!(v.workflow_type, Some(WorkflowKind::Sequential));
        assert!(v.tokens_count.unwrap() > 10);
        assert!(v.error.is_none());
    }

    #[test]
    fn test_validate_rejects_missing_workflow() {
        let v = runtime(StubCompletion::new("")).validate("swarm s { agent a { capabilities: \"llm\" } }");
        assert!(!v.valid);
        assert!(v.error.unwrap().contains("Compilation failed"));
    }

    #[test]
    fn test_validate_rejects_undeclared_agent() {
        let v = runtime(StubCompletion::new(""))
            .validate("swarm s { agent a { capabilities: \"llm\" } workflow { a() ghost() } }");
        assert!(!v.valid);
        assert!(v.error.unwrap().contains("'ghost'"));
    }

    #[test]
    fn test_validate_checks_nested_swarms() {
        let source = r#"swarm outer {
            agent team {
                swarm inner {
                    agent w { capabilities: "llm" }
                    workflow { w() phantom() }
                }
            }
            workflow { team() }
        }"#;
        let v = runtime(StubCompletion::new("")).validate(source);
        assert!(!v.valid);
        assert!(v.error.unwrap().contains("swarm 'inner'"));
    }

    #[test]
    fn test_validate_reports_lex_and_parse_errors() {
        let rt = runtime(StubCompletion::new(""));
        assert!(rt.validate("swarm s { @ }").error.unwrap().contains("Unexpected character"));
        assert!(rt.validate("agent a {}").error.unwrap().contains("Expected"));
    }

    #[tokio::test]
    async fn test_front_end_errors_are_returned() {
        let rt = runtime(StubCompletion::new(""));
        let err = rt.execute_source("swarm {", DataMap::new()).await.unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[tokio::test]
    async fn test_process_llm_request_seeds_user_command() {
        let stub = StubCompletion::new("plan");
        let rt = runtime(stub.clone());
        let source = r#"```m
swarm s {
    agent planner { capabilities: "llm" }
    workflow { planner(input: "user_command", output: "plan") }
}
```"#;
        let result = rt.process_llm_request(source, "ship it").await.unwrap();
        assert!(result.success);
        assert_eq!(result.final_data["plan"], json!("plan"));
        assert_eq!(stub.prompts(), vec!["user_command: ship it".to_string()]);
    }

    #[tokio::test]
    async fn test_orchestrate_runs_generated_swarm() {
        let script = ScriptedCompletion::new(vec![
            Ok("```\nswarm gen {\n agent w { capabilities: \"llm\" }\n workflow { w(input: \"user_command\", output: \"answer\") }\n}\n```".into()),
            Ok("42".into()),
        ]);
        let rt = runtime(script);
        let run = rt.orchestrate("what is the answer").await.unwrap();

        assert!(run.source.starts_with("swarm gen"));
        assert_eq!(run.spec.name, "gen");
        assert!(run.result.success);
        assert_eq!(run.result.final_data["answer"], json!("42"));
    }

    #[tokio::test]
    async fn test_orchestrate_rejects_undeclared_agents() {
        let script = ScriptedCompletion::new(vec![Ok(
            "swarm gen { agent w { capabilities: \"llm\" } workflow { nobody() } }".into(),
        )]);
        let err = runtime(script).orchestrate("x").await.unwrap_err();
        assert_eq!(err.kind(), "compilation");
    }

    #[tokio::test]
    async fn test_registered_tool_is_dispatched() {
        let rt = runtime(StubCompletion::new("unused"));
        let tool = StubTool::new("lookup", json!({"found": true}));
        rt.register_tool(tool.clone()).await;

        let source = r#"swarm s {
            agent finder { capabilities: "mcp, lookup" }
            workflow { finder(input: "q", output: "hit") }
        }"#;
        let mut data = DataMap::new();
        data.insert("q".into(), json!("needle"));
        let result = rt.execute_source(source, data).await.unwrap();

        assert!(result.success);
        assert_eq!(result.final_data["hit"], json!({"lookup": {"found": true}}));
        assert_eq!(tool.calls(), vec![json!({"q": "needle"})]);
    }

    #[test]
    fn test_summarize_and_template() {
        let rt = runtime(StubCompletion::new(""));
        let spec = rt.parse_and_compile(&rt.template("Research task")).unwrap();
        let summary = rt.summarize(&spec);

        assert_eq!(summary.name, "research_task");
        assert_eq!(summary.total_agents, 2);
        assert_eq!(summary.agent_types.get("llm"), Some(&1));
        assert_eq!(summary.agent_types.get("mcp"), Some(&1));
        assert_eq!(summary.execution_strategy, ExecutionStrategy::Linear);
        assert_eq!(
            summary.description,
            "Swarm 'research_task' with 2 agents and sequential workflow"
        );
        assert!(rt.language_guide().contains("Workflow types"));
        assert!(rt.to_json(&spec).unwrap().contains("\"execution_plan\""));
    }

    struct Shout;

    impl AgentFactory for Shout {
        fn run<'a>(
            &'a self,
            agent: &'a mswarm_lang::CompiledAgent,
            inputs: &'a crate::StepInputs,
        ) -> futures::future::BoxFuture<'a, Result<serde_json::Value>> {
            Box::pin(async move { Ok(json!(format!("{}: {}", agent.name, inputs.to_prompt().to_uppercase()))) })
        }
    }

    #[tokio::test]
    async fn test_registered_agent_factory_runs_llm_agents() {
        let stub = StubCompletion::new("unused");
        let rt = runtime(stub.clone());
        rt.register_agent_factory(AgentKind::Llm, Shout).await;

        let mut data = DataMap::new();
        data.insert("x".into(), json!("hi"));
        let result = rt.execute_source(SINGLE_LLM_AGENT, data).await.unwrap();

        assert!(result.success);
        assert_eq!(result.final_data["y"], json!("a: X: HI"));
        assert!(stub.prompts().is_empty());
    }
}
