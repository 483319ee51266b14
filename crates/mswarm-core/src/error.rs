use thiserror::Error;

#[derive(Debug, Error)]
pub enum MswarmError {
    // Front-end errors
    #[error("Unexpected character at line {line}, column {column}: '{ch}'")]
    Lex { line: usize, column: usize, ch: char },

    #[error("Expected {expected}, got {got} at line {line}")]
    Parse {
        expected: String,
        got: String,
        line: usize,
    },

    #[error("Compilation failed: {0}")]
    Compilation(String),

    // Step errors
    #[error("Agent not found in swarm: {0}")]
    AgentNotFound(String),

    #[error("Agent {agent} failed: {message}")]
    StepFailure { agent: String, message: String },

    #[error("Agent {agent} timed out after {timeout_secs}s")]
    StepTimeout { agent: String, timeout_secs: u64 },

    #[error("Workflow aborted by agent {agent}: {message}")]
    Aborted { agent: String, message: String },

    #[error("Swarm nesting exceeds maximum depth ({0})")]
    NestingTooDeep(usize),

    // Tool errors
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("Tool input validation failed: {0}")]
    ToolValidation(String),

    // Completion errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MswarmError {
    /// Short label for the failure class, recorded on step outcomes.
    pub fn kind(&self) -> &'static str {
        match self {
            MswarmError::Lex { .. } => "lex",
            MswarmError::Parse { .. } => "parse",
            MswarmError::Compilation(_) => "compilation",
            MswarmError::AgentNotFound(_) => "lookup",
            MswarmError::StepTimeout { .. } | MswarmError::ToolTimeout { .. } => "timeout",
            MswarmError::Aborted { .. } => "abort",
            MswarmError::NestingTooDeep(_) => "nesting",
            MswarmError::ToolNotFound(_)
            | MswarmError::ToolExecution { .. }
            | MswarmError::ToolValidation(_) => "tool",
            MswarmError::LlmRequest(_) | MswarmError::LlmParse(_) => "completion",
            MswarmError::Config(_) | MswarmError::ConfigNotFound(_) => "config",
            MswarmError::StepFailure { .. } | MswarmError::Io(_) | MswarmError::Json(_) => {
                "step"
            }
        }
    }

    /// Whether re-running the failed dispatch could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            MswarmError::AgentNotFound(_)
                | MswarmError::NestingTooDeep(_)
                | MswarmError::Aborted { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MswarmError>;
