pub mod echo;
pub mod openai;
pub mod retry;

use std::sync::Arc;

use mswarm_core::config::LlmConfig;
use mswarm_core::error::{MswarmError, Result};
use mswarm_core::traits::TextCompletion;

pub use echo::EchoCompletion;
pub use openai::OpenAiCompletion;
pub use retry::RetryingCompletion;

/// Build the completion capability described by `config`, wrapped in a
/// retrying client when `[llm.retry]` is present.
pub fn create_completion(config: &LlmConfig) -> Result<Arc<dyn TextCompletion>> {
    let client: Arc<dyn TextCompletion> = match config.provider.as_str() {
        "echo" => Arc::new(EchoCompletion),
        "openai" | "ollama" | "groq" | "openrouter" | "vllm" => {
            Arc::new(OpenAiCompletion::new(config.clone())?)
        }
        other => {
            return Err(MswarmError::Config(format!(
                "unknown llm provider: {}",
                other
            )))
        }
    };

    Ok(match &config.retry {
        Some(retry) => Arc::new(RetryingCompletion::new(client, retry.clone())),
        None => client,
    })
}
