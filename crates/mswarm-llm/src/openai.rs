use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use mswarm_core::config::LlmConfig;
use mswarm_core::error::{MswarmError, Result};
use mswarm_core::traits::TextCompletion;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible chat-completions client. Works with OpenAI, Ollama,
/// vLLM, Groq, OpenRouter and anything else speaking the same protocol.
pub struct OpenAiCompletion {
    http: Client,
    config: LlmConfig,
    label: String,
}

impl OpenAiCompletion {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MswarmError::LlmRequest(e.to_string()))?;
        let label = format!("{}/{}", config.provider, config.model);
        Ok(Self {
            http,
            config,
            label,
        })
    }

    fn endpoint(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(OPENAI_API_URL)
    }

    fn request(&self, prompt: String) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.config.system_prompt {
            messages.push(OaiMessage {
                role: "system".into(),
                content: system.clone(),
            });
        }
        messages.push(OaiMessage {
            role: "user".into(),
            content: prompt,
        });

        ChatRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: self.config.max_tokens,
            temperature: (self.config.temperature > 0.0).then_some(self.config.temperature),
            stream: false,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Serialize)]
struct OaiMessage {
    role: String,
    content: String,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// First choice's text, or an `LlmParse` error.
fn extract_text(body: &str) -> Result<String> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| MswarmError::LlmParse(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| MswarmError::LlmParse("response has no message content".into()))
}

impl TextCompletion for OpenAiCompletion {
    fn invoke(&self, prompt: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let body = self.request(prompt);
            let mut req = self.http.post(self.endpoint()).json(&body);

            if let Some(api_key) = &self.config.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }

            debug!(model = %self.config.model, "Sending completion request");
            let response = req
                .send()
                .await
                .map_err(|e| MswarmError::LlmRequest(e.to_string()))?;

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| MswarmError::LlmRequest(e.to_string()))?;

            if !status.is_success() {
                return Err(MswarmError::LlmRequest(format!("HTTP {}: {}", status, text)));
            }

            extract_text(&text)
        })
    }

    fn name(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let client = OpenAiCompletion::new(LlmConfig {
            provider: "openai".into(),
            system_prompt: Some("be brief".into()),
            temperature: 0.0,
            ..Default::default()
        })
        .unwrap();
        let value = serde_json::to_value(client.request("hello".into())).unwrap();
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "hello");
        assert_eq!(value["stream"], false);
        assert!(value.get("temperature").is_none());
        assert_eq!(client.name(), "openai/gpt-4o-mini");
    }

    #[test]
    fn test_extract_text() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"hi there"}}]}"#;
        assert_eq!(extract_text(body).unwrap(), "hi there");

        let empty = r#"{"choices":[]}"#;
        assert!(matches!(extract_text(empty), Err(MswarmError::LlmParse(_))));
        assert!(matches!(extract_text("nope"), Err(MswarmError::LlmParse(_))));
    }
}
