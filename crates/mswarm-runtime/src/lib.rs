//! Execution side of mswarm: runs compiled swarms against a text-completion
//! capability and a tool registry.

pub mod authoring;
pub mod context;
pub mod dispatch;
pub mod executor;
pub mod result;
pub mod runtime;
pub mod transform;

pub use context::{ExecutionContext, StepInputs};
pub use dispatch::{AgentDispatcher, AgentFactory};
pub use executor::Executor;
pub use result::{ExecutionResult, StepOutcome, StepResults};
pub use runtime::{MRuntime, Orchestration, SwarmSummary, Validation};
