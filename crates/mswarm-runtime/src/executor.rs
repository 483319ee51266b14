use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::BoxFuture;
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use mswarm_core::config::ExecutorConfig;
use mswarm_core::error::{MswarmError, Result};
use mswarm_core::types::{is_truthy, AgentKind, DataMap, ErrorHandler, WorkflowKind};
use mswarm_lang::{CompiledAgent, CompiledStep, CompiledSwarm};

use crate::context::{resolve_inputs, ExecutionContext, StepInputs};
use crate::dispatch::{AgentDispatcher, AgentFactory};
use crate::result::{ExecutionResult, StepOutcome};
use crate::transform::{apply_filter, apply_transform};

/// Interprets compiled swarms.
///
/// Every step runs through the same path: resolve inputs, dispatch under a
/// deadline with retries, transform, filter, and hand back an outcome carrying
/// the step's output delta. Workflow kinds differ only in how they order steps
/// and how they judge success.
#[derive(Clone)]
pub struct Executor {
    dispatcher: AgentDispatcher,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(dispatcher: AgentDispatcher, config: ExecutorConfig) -> Self {
        Self { dispatcher, config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &AgentDispatcher {
        &self.dispatcher
    }

    /// Run every agent of `kind` through `factory` instead of the built-in
    /// dispatch.
    pub async fn register_agent_factory(&self, kind: AgentKind, factory: impl AgentFactory) {
        self.dispatcher.register_factory(kind, factory).await;
    }

    /// Run `spec` against `initial_data`. Never fails: step problems, aborts
    /// and internal errors all come back inside the result.
    pub async fn execute_swarm(&self, spec: &CompiledSwarm, initial_data: DataMap) -> ExecutionResult {
        let execution_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let start = Instant::now();

        info!(
            execution_id = %execution_id,
            swarm = %spec.name,
            workflow = %spec.workflow.kind,
            steps = spec.workflow.steps.len(),
            "Executing swarm"
        );

        let mut ctx = ExecutionContext::new(&spec.name, initial_data);
        let (success, error) = match self.run_workflow(spec, &mut ctx, 0).await {
            Ok(success) => (success, None),
            Err(e) => {
                error!(execution_id = %execution_id, swarm = %spec.name, error = %e, "Swarm execution stopped");
                (false, Some(e.to_string()))
            }
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(execution_id = %execution_id, swarm = %spec.name, success, elapsed_ms, "Swarm finished");

        let (final_data, results, iterations, skipped, errors) = ctx.into_parts();
        ExecutionResult {
            execution_id,
            swarm: spec.name.clone(),
            workflow: spec.workflow.kind,
            success,
            results,
            iterations,
            skipped,
            final_data,
            errors,
            error,
            started_at,
            elapsed_ms,
        }
    }

    /// Run a nested swarm to completion and return its final data.
    fn run_nested<'a>(
        &'a self,
        spec: &'a CompiledSwarm,
        data: DataMap,
        depth: usize,
    ) -> BoxFuture<'a, Result<DataMap>> {
        Box::pin(async move {
            debug!(swarm = %spec.name, depth, "Entering nested swarm");
            let mut ctx = ExecutionContext::new(&spec.name, data);
            let success = self.run_workflow(spec, &mut ctx, depth).await?;
            let (final_data, _, _, _, errors) = ctx.into_parts();
            if success {
                Ok(final_data)
            } else {
                Err(MswarmError::StepFailure {
                    agent: spec.name.clone(),
                    message: errors.join("; "),
                })
            }
        })
    }

    /// Returns the success verdict, or `Err` when the run was cut short.
    async fn run_workflow(&self, spec: &CompiledSwarm, ctx: &mut ExecutionContext, depth: usize) -> Result<bool> {
        match spec.workflow.kind {
            WorkflowKind::Sequential => self.run_sequential(spec, ctx, depth).await,
            WorkflowKind::Parallel => self.run_parallel(spec, ctx, depth).await,
            WorkflowKind::Conditional => self.run_conditional(spec, ctx, depth).await,
            WorkflowKind::Loop => self.run_loop(spec, ctx, depth).await,
        }
    }

    async fn run_sequential(&self, spec: &CompiledSwarm, ctx: &mut ExecutionContext, depth: usize) -> Result<bool> {
        info!(swarm = %spec.name, "Running sequential workflow");
        self.run_steps(spec, ctx, depth).await?;
        Ok(ctx.errors().is_empty())
    }

    async fn run_parallel(&self, spec: &CompiledSwarm, ctx: &mut ExecutionContext, depth: usize) -> Result<bool> {
        let (independent, dependent): (Vec<&CompiledStep>, Vec<&CompiledStep>) =
            spec.workflow.steps.iter().partition(|s| s.is_independent());

        let workers = match self.config.max_parallel {
            0 => independent.len(),
            cap => cap.min(independent.len()),
        }
        .max(1);
        info!(
            swarm = %spec.name,
            independent = independent.len(),
            dependent = dependent.len(),
            workers,
            "Running parallel workflow"
        );

        // Workers read one snapshot; deltas merge in completion order.
        let owned = ctx.data().clone();
        let snapshot = &owned;
        let mut abort = None;
        {
            let jobs: Vec<BoxFuture<'_, (&CompiledStep, StepOutcome)>> = independent
                .iter()
                .copied()
                .map(|step| -> BoxFuture<'_, _> {
                    Box::pin(async move { (step, self.run_step(spec, step, snapshot, depth).await) })
                })
                .collect();
            let mut pool = futures::stream::iter(jobs).buffer_unordered(workers);

            while let Some((step, outcome)) = pool.next().await {
                if abort.is_none() {
                    abort = abort_signal(step, &outcome);
                }
                ctx.record(outcome);
            }
        }
        if let Some(signal) = abort {
            return Err(signal);
        }

        for step in dependent {
            self.run_and_record(spec, step, ctx, depth).await?;
        }

        Ok(ctx.results.all_succeeded())
    }

    async fn run_conditional(&self, spec: &CompiledSwarm, ctx: &mut ExecutionContext, depth: usize) -> Result<bool> {
        info!(swarm = %spec.name, "Running conditional workflow");
        let conditions = spec.workflow.conditions.as_deref().unwrap_or_default();

        for (i, step) in spec.workflow.steps.iter().enumerate() {
            if let Some(condition) = conditions.get(i) {
                let holds = ctx.get(condition).map(is_truthy).unwrap_or(false);
                if !holds {
                    info!(agent = %step.agent, condition = %condition, "Skipping step, condition not met");
                    ctx.skipped.push(step.agent.clone());
                    continue;
                }
            }
            self.run_and_record(spec, step, ctx, depth).await?;
        }

        Ok(ctx.errors().is_empty())
    }

    async fn run_loop(&self, spec: &CompiledSwarm, ctx: &mut ExecutionContext, depth: usize) -> Result<bool> {
        let max_iterations = spec
            .workflow
            .max_iterations
            .unwrap_or(self.config.default_max_iterations);

        for iteration in 0..max_iterations {
            info!(swarm = %spec.name, iteration = iteration + 1, max_iterations, "Loop iteration");
            ctx.results = Default::default();

            let outcome = self.run_steps(spec, ctx, depth).await;

            let bucket = std::mem::take(&mut ctx.results);
            let done = bucket.all_succeeded();
            ctx.results = bucket.clone();
            ctx.iterations.push(bucket);
            outcome?;

            if done {
                debug!(swarm = %spec.name, iterations = iteration + 1, "Loop iteration fully succeeded, stopping");
                break;
            }
        }

        Ok(ctx.results.all_succeeded())
    }

    async fn run_steps(&self, spec: &CompiledSwarm, ctx: &mut ExecutionContext, depth: usize) -> Result<()> {
        for step in &spec.workflow.steps {
            self.run_and_record(spec, step, ctx, depth).await?;
        }
        Ok(())
    }

    /// Run one step against the live context and apply its error handler.
    async fn run_and_record(
        &self,
        spec: &CompiledSwarm,
        step: &CompiledStep,
        ctx: &mut ExecutionContext,
        depth: usize,
    ) -> Result<()> {
        let outcome = self.run_step(spec, step, ctx.data(), depth).await;
        let abort = abort_signal(step, &outcome);
        ctx.record(outcome);
        match abort {
            Some(signal) => Err(signal),
            None => Ok(()),
        }
    }

    /// Execute one step against `data` without touching it.
    async fn run_step(&self, spec: &CompiledSwarm, step: &CompiledStep, data: &DataMap, depth: usize) -> StepOutcome {
        let start = Instant::now();
        info!(agent = %step.agent, "Executing agent");

        let Some(agent) = spec.agent(&step.agent) else {
            let err = MswarmError::AgentNotFound(step.agent.clone());
            error!(agent = %step.agent, error = %err, "Step failed");
            return StepOutcome::failed(&step.agent, &err, 0, 0);
        };

        let inputs = resolve_inputs(&step.agent, &step.inputs, data);
        let retries = step.retry.unwrap_or(match step.error_handler {
            Some(ErrorHandler::Retry) => self.config.default_retries,
            _ => 0,
        });
        let timeout = step
            .timeout
            .or(self.config.default_step_timeout_secs)
            .filter(|secs| *secs > 0);

        let mut attempts = 0;
        let result = loop {
            attempts += 1;
            match self.attempt(agent, &inputs, timeout, depth).await {
                Ok(value) => break Ok(value),
                Err(e) if e.is_retryable() && attempts <= retries => {
                    let backoff = self.backoff(attempts - 1);
                    warn!(
                        agent = %step.agent,
                        attempt = attempts,
                        retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Retrying step"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => break Err(e),
            }
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(raw) => {
                let mut value = raw.clone();
                if let Some(name) = &step.transform {
                    value = apply_transform(name, value);
                }
                if let Some(name) = &step.filter {
                    value = apply_filter(name, value);
                }
                let outputs = step
                    .outputs
                    .iter()
                    .map(|name| (name.clone(), value.clone()))
                    .collect();

                info!(agent = %step.agent, attempts, elapsed_ms, "Agent completed successfully");
                StepOutcome {
                    agent: step.agent.clone(),
                    success: true,
                    result: Some(raw),
                    outputs,
                    error: None,
                    error_kind: None,
                    attempts,
                    elapsed_ms,
                }
            }
            Err(e) => {
                error!(agent = %step.agent, attempts, error = %e, "Step failed");
                StepOutcome::failed(&step.agent, &e, attempts, elapsed_ms)
            }
        }
    }

    async fn attempt(
        &self,
        agent: &CompiledAgent,
        inputs: &StepInputs,
        timeout: Option<u64>,
        depth: usize,
    ) -> Result<Value> {
        let call = self.invoke_agent(agent, inputs, depth);
        match timeout {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), call)
                .await
                .map_err(|_| MswarmError::StepTimeout {
                    agent: agent.name.clone(),
                    timeout_secs: secs,
                })?,
            None => call.await,
        }
    }

    /// Nested swarm bodies take precedence over type-based dispatch.
    async fn invoke_agent(&self, agent: &CompiledAgent, inputs: &StepInputs, depth: usize) -> Result<Value> {
        match &agent.swarm {
            Some(child) => {
                if depth + 1 > self.config.max_nesting_depth {
                    return Err(MswarmError::NestingTooDeep(self.config.max_nesting_depth));
                }
                let data = self.run_nested(child, inputs.to_data(), depth + 1).await?;
                Ok(Value::Object(data.into_iter().collect()))
            }
            None => self.dispatcher.dispatch(agent, inputs).await,
        }
    }

    fn backoff(&self, retry: u32) -> Duration {
        let ms = self
            .config
            .retry_backoff_ms
            .saturating_mul(2u64.saturating_pow(retry))
            .min(self.config.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// `Aborted` if a failed step asked for the run to stop.
fn abort_signal(step: &CompiledStep, outcome: &StepOutcome) -> Option<MswarmError> {
    (!outcome.success && step.error_handler == Some(ErrorHandler::Abort)).then(|| {
        MswarmError::Aborted {
            agent: step.agent.clone(),
            message: outcome.error.clone().unwrap_or_default(),
        }
    })
}
