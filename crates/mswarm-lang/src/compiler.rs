use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};

use mswarm_core::error::{MswarmError, Result};
use mswarm_core::types::{AgentKind, ErrorHandler, WorkflowKind};

use crate::ast::{Ast, SwarmDefinition, SwarmId, WorkflowDefinition, WorkflowStep};
use crate::spec::{
    CompiledAgent, CompiledStep, CompiledSwarm, CompiledWorkflow, DataFlow, ExecutionPlan, Phase,
    SpecKind,
};

/// Iteration bound given to loop workflows that declare none.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Lowers an [`Ast`] to a [`CompiledSwarm`].
///
/// Keeps every top-level swarm it has compiled, keyed by name, so a host can
/// look a spec up again without recompiling.
#[derive(Debug, Default)]
pub struct Compiler {
    compiled: HashMap<String, CompiledSwarm>,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile the root swarm of `ast`. All-or-nothing: any failure yields
    /// `MswarmError::Compilation` and nothing is cached.
    pub fn compile(&mut self, ast: &Ast) -> Result<CompiledSwarm> {
        let spec = compile_swarm(ast, ast.root_id()).map_err(|e| match e {
            MswarmError::Compilation(_) => e,
            other => MswarmError::Compilation(other.to_string()),
        })?;

        info!(
            swarm = %spec.name,
            agents = spec.agents.len(),
            steps = spec.workflow.steps.len(),
            workflow = %spec.workflow.kind,
            "Compiled swarm"
        );
        self.compiled.insert(spec.name.clone(), spec.clone());
        Ok(spec)
    }

    pub fn compiled(&self, name: &str) -> Option<&CompiledSwarm> {
        self.compiled.get(name)
    }

    pub fn compiled_names(&self) -> Vec<&str> {
        self.compiled.keys().map(String::as_str).collect()
    }
}

/// Compile with a throwaway [`Compiler`].
pub fn compile(ast: &Ast) -> Result<CompiledSwarm> {
    Compiler::new().compile(ast)
}

fn compile_swarm(ast: &Ast, id: SwarmId) -> Result<CompiledSwarm> {
    let swarm = ast
        .swarm(id)
        .ok_or_else(|| MswarmError::Compilation(format!("dangling swarm reference {}", id.0)))?;

    let agents = register_agents(ast, swarm)?;

    let workflow_def = swarm.workflow.as_ref().ok_or_else(|| {
        MswarmError::Compilation(format!("swarm '{}' has no workflow block", swarm.name))
    })?;
    let workflow = compile_workflow(workflow_def)?;
    let execution_plan = plan(workflow_def, &workflow.steps);

    debug!(swarm = %swarm.name, phases = execution_plan.phases.len(), "Built execution plan");

    Ok(CompiledSwarm {
        kind: SpecKind::Swarm,
        name: swarm.name.clone(),
        agents,
        workflow,
        config: swarm.config.clone(),
        execution_plan,
    })
}

/// Agents are scoped to their own swarm; nested bodies get their own registry.
fn register_agents(ast: &Ast, swarm: &SwarmDefinition) -> Result<BTreeMap<String, CompiledAgent>> {
    let mut agents = BTreeMap::new();

    for agent in &swarm.agents {
        if agents.contains_key(&agent.name) {
            return Err(MswarmError::Compilation(format!(
                "duplicate agent '{}' in swarm '{}' (line {})",
                agent.name, swarm.name, agent.span.line
            )));
        }

        let nested = match agent.body {
            Some(body) => Some(Box::new(compile_swarm(ast, body)?)),
            None => None,
        };

        agents.insert(
            agent.name.clone(),
            CompiledAgent {
                name: agent.name.clone(),
                role: agent.role.clone(),
                capabilities: agent.capabilities.clone(),
                inputs: agent.inputs.clone(),
                outputs: agent.outputs.clone(),
                config: agent.config.clone(),
                kind: AgentKind::from_capabilities(&agent.capabilities),
                swarm: nested,
            },
        );
    }

    Ok(agents)
}

fn compile_workflow(workflow: &WorkflowDefinition) -> Result<CompiledWorkflow> {
    let strategy = workflow.kind.execution_strategy();

    let steps = workflow
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let error_handler = step
                .error_handler
                .as_deref()
                .map(|h| {
                    h.parse::<ErrorHandler>().map_err(|e| {
                        MswarmError::Compilation(format!(
                            "step '{}' (line {}): {}",
                            step.agent_name, step.span.line, e
                        ))
                    })
                })
                .transpose()?;

            Ok(CompiledStep {
                agent: step.agent_name.clone(),
                inputs: step.inputs.clone(),
                outputs: step.outputs.clone(),
                transform: step.transform.clone(),
                filter: step.filter.clone(),
                timeout: step.timeout,
                retry: step.retry,
                error_handler,
                dependencies: find_dependencies(step, &workflow.steps[..i]),
                execution_strategy: strategy,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let max_iterations = match workflow.kind {
        WorkflowKind::Loop => Some(workflow.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS)),
        _ => workflow.max_iterations,
    };

    Ok(CompiledWorkflow {
        kind: workflow.kind,
        alias: workflow.alias.clone(),
        steps,
        conditions: workflow.conditions.clone(),
        max_iterations,
        execution_strategy: strategy,
    })
}

/// Agents of earlier steps that produce at least one of `step`'s inputs.
fn find_dependencies(step: &WorkflowStep, previous: &[WorkflowStep]) -> Vec<String> {
    previous
        .iter()
        .filter(|prev| prev.outputs.iter().any(|o| step.inputs.contains(o)))
        .map(|prev| prev.agent_name.clone())
        .collect()
}

fn plan(workflow: &WorkflowDefinition, steps: &[CompiledStep]) -> ExecutionPlan {
    let mut plan = ExecutionPlan::default();
    let mut phase_id = 0;

    for (step_id, step) in steps.iter().enumerate() {
        plan.phases.push(Phase {
            phase_id,
            step_id,
            agent: step.agent.clone(),
            dependencies: step.dependencies.clone(),
            inputs: step.inputs.clone(),
            outputs: step.outputs.clone(),
            execution_type: workflow.kind,
        });
        plan.dependencies
            .insert(step.agent.clone(), step.dependencies.clone());
        plan.data_flow.insert(
            step.agent.clone(),
            DataFlow {
                inputs: step.inputs.clone(),
                outputs: step.outputs.clone(),
                transform: step.transform.clone(),
                filter: step.filter.clone(),
            },
        );
        if let Some(handler) = step.error_handler {
            plan.error_handling.insert(step.agent.clone(), handler);
        }
        if let Some(timeout) = step.timeout {
            plan.monitoring.timeouts.insert(step.agent.clone(), timeout);
        }
        if let Some(retry) = step.retry {
            plan.monitoring.retries.insert(step.agent.clone(), retry);
        }

        if workflow.kind == WorkflowKind::Sequential {
            phase_id += 1;
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use mswarm_core::types::ExecutionStrategy;

    fn compile_src(source: &str) -> Result<CompiledSwarm> {
        compile(&parse(&tokenize(source)?)?)
    }

    const PIPELINE: &str = r#"
swarm research {
    agent searcher { capabilities: "mcp, file_search" outputs: "hits" }
    agent writer { capabilities: "llm" inputs: "hits" outputs: "draft" }
    agent reviewer { capabilities: "review" inputs: "draft, hits" outputs: "final" }

    workflow sequential {
        searcher(output: "hits")
        writer(input: "hits", output: "draft", error: "retry", retry: 2)
        reviewer(input: "draft, hits", output: "final", error: "abort")
    }
}"#;

    #[test]
    fn test_agent_registry_and_types() {
        let spec = compile_src(PIPELINE).unwrap();
        let names: Vec<_> = spec.agents.keys().cloned().collect();
        assert_eq!(names, vec!["reviewer", "searcher", "writer"]);
        assert_eq!(spec.agent("searcher").unwrap().kind, AgentKind::Mcp);
        assert_eq!(spec.agent("writer").unwrap().kind, AgentKind::Llm);
        assert_eq!(spec.agent("reviewer").unwrap().kind, AgentKind::Hybrid);
        assert_eq!(spec.workflow.steps.len(), 3);
    }

    #[test]
    fn test_dependencies_look_backwards_only() {
        let spec = compile_src(PIPELINE).unwrap();
        let steps = &spec.workflow.steps;
        assert!(steps[0].dependencies.is_empty());
        assert_eq!(steps[1].dependencies, vec!["searcher"]);
        assert_eq!(steps[2].dependencies, vec!["searcher", "writer"]);

        let plan = &spec.execution_plan;
        assert_eq!(plan.dependencies["writer"], vec!["searcher"]);
        assert_eq!(plan.error_handling["writer"], ErrorHandler::Retry);
        assert_eq!(plan.error_handling["reviewer"], ErrorHandler::Abort);
        assert!(!plan.error_handling.contains_key("searcher"));
        assert_eq!(plan.data_flow["reviewer"].inputs, vec!["draft", "hits"]);
    }

    #[test]
    fn test_sequential_phases_increment() {
        let spec = compile_src(PIPELINE).unwrap();
        let ids: Vec<_> = spec.execution_plan.phases.iter().map(|p| p.phase_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(spec.workflow.execution_strategy, ExecutionStrategy::Linear);
    }

    #[test]
    fn test_parallel_phases_share_zero() {
        let spec = compile_src(
            r#"swarm p {
                agent a { } agent b { }
                workflow parallel { a(output: "x") b(input: "x") }
            }"#,
        )
        .unwrap();
        let ids: Vec<_> = spec.execution_plan.phases.iter().map(|p| p.phase_id).collect();
        assert_eq!(ids, vec![0, 0]);
        assert_eq!(spec.workflow.steps[1].dependencies, vec!["a"]);
        assert_eq!(spec.workflow.execution_strategy, ExecutionStrategy::Concurrent);
        assert!(spec.workflow.steps[0].is_independent());
    }

    #[test]
    fn test_loop_gets_default_iterations() {
        let spec = compile_src("swarm l { agent a { } workflow loop { a() } }").unwrap();
        assert_eq!(spec.workflow.max_iterations, Some(DEFAULT_MAX_ITERATIONS));
        assert_eq!(spec.workflow.execution_strategy, ExecutionStrategy::Iterative);

        let spec = compile_src("swarm s { agent a { } workflow sequential { a() } }").unwrap();
        assert_eq!(spec.workflow.max_iterations, None);
    }

    #[test]
    fn test_missing_workflow_is_compilation_error() {
        let err = compile_src("swarm s { agent a { } }").unwrap_err();
        assert!(matches!(err, MswarmError::Compilation(ref m) if m.contains("no workflow")));
    }

    #[test]
    fn test_duplicate_agent_is_compilation_error() {
        let err = compile_src("swarm s { agent a { } agent a { } workflow { a() } }").unwrap_err();
        assert!(matches!(err, MswarmError::Compilation(ref m) if m.contains("duplicate agent")));
    }

    #[test]
    fn test_unknown_error_handler_is_compilation_error() {
        let err =
            compile_src(r#"swarm s { agent a { } workflow { a(error: "explode") } }"#).unwrap_err();
        assert!(matches!(err, MswarmError::Compilation(ref m) if m.contains("explode")));
    }

    #[test]
    fn test_undeclared_step_agent_compiles() {
        let spec = compile_src("swarm s { agent a { } workflow { a() ghost() } }").unwrap();
        assert_eq!(spec.undeclared_agents(), vec!["ghost"]);
    }

    #[test]
    fn test_nested_swarm_compiles_in_own_scope() {
        let spec = compile_src(
            r#"swarm outer {
                agent team {
                    swarm inner {
                        agent worker { capabilities: "llm" }
                        workflow sequential { worker() }
                    }
                }
                workflow sequential { team() }
            }"#,
        )
        .unwrap();
        let team = spec.agent("team").unwrap();
        let inner = team.swarm.as_ref().expect("nested swarm");
        assert_eq!(inner.name, "inner");
        assert!(inner.agents.contains_key("worker"));
        assert!(!spec.agents.contains_key("worker"));
    }

    #[test]
    fn test_compiler_caches_by_name() {
        let ast = parse(&tokenize(PIPELINE).unwrap()).unwrap();
        let mut compiler = Compiler::new();
        compiler.compile(&ast).unwrap();
        assert!(compiler.compiled("research").is_some());
        assert_eq!(compiler.compiled_names(), vec!["research"]);
    }

    #[test]
    fn test_json_wire_format() {
        let spec = compile_src(PIPELINE).unwrap();
        let value: serde_json::Value = serde_json::from_str(&spec.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "swarm");
        assert_eq!(value["agents"]["writer"]["type"], "llm");
        assert_eq!(value["workflow"]["type"], "sequential");
        assert_eq!(value["workflow"]["execution_strategy"], "linear");
        assert_eq!(value["workflow"]["steps"][2]["error_handler"], "abort");
        assert_eq!(value["execution_plan"]["phases"][1]["execution_type"], "sequential");

        let back = CompiledSwarm::from_json(&spec.to_json().unwrap()).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn test_monitoring_tracks_step_limits() {
        let spec = compile_src(
            r#"swarm m {
                agent a { } agent b { }
                workflow sequential { a(timeout: 30, retry: 2) b() }
            }"#,
        )
        .unwrap();
        let monitoring = &spec.execution_plan.monitoring;
        assert_eq!(monitoring.timeouts.get("a"), Some(&30));
        assert_eq!(monitoring.retries.get("a"), Some(&2));
        assert!(!monitoring.timeouts.contains_key("b"));

        let value: serde_json::Value = serde_json::from_str(&spec.to_json().unwrap()).unwrap();
        assert_eq!(value["execution_plan"]["monitoring"]["timeouts"]["a"], 30);

        let plain = compile_src("swarm p { agent a { } workflow { a() } }").unwrap();
        let value: serde_json::Value = serde_json::from_str(&plain.to_json().unwrap()).unwrap();
        assert_eq!(value["execution_plan"]["monitoring"], serde_json::json!({}));
    }
}
