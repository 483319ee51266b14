use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MswarmError, Result};

/// Top-level mswarm configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Workflow interpreter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Loop bound used when a compiled loop workflow carries none.
    #[serde(default = "default_max_iterations")]
    pub default_max_iterations: u32,
    /// Deadline applied to steps that declare no `timeout`.
    #[serde(default)]
    pub default_step_timeout_secs: Option<u64>,
    /// Retries granted to `error: "retry"` steps without a `retry` count.
    #[serde(default = "default_retries")]
    pub default_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Cap on concurrent workers in parallel workflows (0 = one per independent step).
    #[serde(default)]
    pub max_parallel: usize,
    /// How deep agent-contains-swarm composition may recurse at run time.
    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_max_iterations: default_max_iterations(),
            default_step_timeout_secs: None,
            default_retries: default_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_parallel: 0,
            max_nesting_depth: default_max_nesting_depth(),
        }
    }
}

fn default_max_iterations() -> u32 { 10 }
fn default_retries() -> u32 { 1 }
fn default_retry_backoff_ms() -> u64 { 200 }
fn default_max_backoff_ms() -> u64 { 5000 }
fn default_max_nesting_depth() -> usize { 8 }

/// Text-completion provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// `openai` (any OpenAI-compatible endpoint) or `echo` (offline).
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout(),
            system_prompt: None,
            retry: None,
        }
    }
}

fn default_provider() -> String { "echo".to_string() }
fn default_model() -> String { "gpt-4o-mini".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.7 }
fn default_llm_timeout() -> u64 { 120 }

/// Retry configuration for completion requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Built-in tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Working directory for built-in tools.
    #[serde(default = "default_workspace")]
    pub workspace: String,
    /// Register the built-in tool set.
    #[serde(default = "default_builtin")]
    pub builtin: bool,
    /// Register `run_terminal` (shell execution).
    #[serde(default)]
    pub allow_terminal: bool,
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            builtin: default_builtin(),
            allow_terminal: false,
            timeout_secs: default_tool_timeout(),
        }
    }
}

fn default_workspace() -> String { ".".to_string() }
fn default_builtin() -> bool { true }
fn default_tool_timeout() -> u64 { 30 }

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| MswarmError::ConfigNotFound(path.display().to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text, expanding `${ENV_VAR}` references first.
    pub fn from_toml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        toml::from_str(&expanded).map_err(|e| MswarmError::Config(e.to_string()))
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Resolve the tool workspace directory (expand ~).
    pub fn workspace_dir(&self) -> PathBuf {
        let ws = &self.tools.workspace;
        if let Some(rest) = ws.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(ws)
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.executor.default_max_iterations, 10);
        assert_eq!(config.executor.default_retries, 1);
        assert_eq!(config.executor.max_parallel, 0);
        assert_eq!(config.llm.provider, "echo");
        assert!(config.tools.builtin);
        assert!(!config.tools.allow_terminal);
    }

    #[test]
    fn test_partial_sections() {
        let config = AppConfig::from_toml(
            r#"
[executor]
default_step_timeout_secs = 5
max_parallel = 4

[tools]
allow_terminal = true
"#,
        )
        .unwrap();
        assert_eq!(config.executor.default_step_timeout_secs, Some(5));
        assert_eq!(config.executor.max_parallel, 4);
        assert_eq!(config.executor.retry_backoff_ms, 200);
        assert!(config.tools.allow_terminal);
        assert_eq!(config.tools.timeout_secs, 30);
    }

    #[test]
    fn test_unset_env_var_is_kept() {
        let out = expand_env_vars("key = \"${MSWARM_SURELY_UNSET_VAR}\"");
        assert_eq!(out, "key = \"${MSWARM_SURELY_UNSET_VAR}\"");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = AppConfig::from_toml("[executor\nmax_parallel = ").unwrap_err();
        assert!(matches!(err, MswarmError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = AppConfig::load(Path::new("/definitely/not/here/mswarm.toml")).unwrap_err();
        assert!(matches!(err, MswarmError::ConfigNotFound(_)));
    }
}
