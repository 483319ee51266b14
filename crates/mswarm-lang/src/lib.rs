//! The M language front end.
//!
//! ```text
//! source ──► lexer::tokenize ──► parser::parse ──► compiler::compile ──► CompiledSwarm
//!            Vec<Token>          Ast (arena)                              (wire format)
//! ```
//!
//! Agents may contain whole swarms. The parser stores every swarm in an
//! arena and links nested bodies by [`ast::SwarmId`], so the tree never owns
//! its children directly.

pub mod ast;
pub mod compiler;
pub mod lexer;
pub mod parser;
pub mod spec;
pub mod token;

pub use ast::{AgentDefinition, Ast, Span, SwarmDefinition, SwarmId, WorkflowDefinition, WorkflowStep};
pub use compiler::{compile, Compiler, DEFAULT_MAX_ITERATIONS};
pub use lexer::{tokenize, Lexer};
pub use parser::{parse, Parser};
pub use spec::{
    CompiledAgent, CompiledStep, CompiledSwarm, CompiledWorkflow, DataFlow, ExecutionPlan,
    Monitoring, Phase, SpecKind,
};
pub use token::{Token, TokenKind};

use mswarm_core::error::Result;

/// Tokenize, parse and compile `source` in one call.
pub fn compile_source(source: &str) -> Result<CompiledSwarm> {
    let tokens = tokenize(source)?;
    let ast = parse(&tokens)?;
    compile(&ast)
}
