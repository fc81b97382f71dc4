mod client;
pub(crate) mod types;

pub use types::Usage;

use std::time::Duration;

use crate::error::{AiError, Result};
use client::OpenAiClient;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

// =============================================================================
// OpenAi Agent
// =============================================================================

#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    pub(crate) model: String,
    base_url: Option<String>,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

/// A completed chat turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletion {
    pub content: String,
    /// Model that served the request, as reported by the provider.
    pub model: String,
    pub usage: Option<Usage>,
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            max_tokens: 4096,
            temperature: 0.0,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| AiError::Config("OPENAI_API_KEY environment variable not set".into()))?;
        Ok(Self::new(api_key, model))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub(crate) fn client(&self) -> Result<OpenAiClient> {
        let client = OpenAiClient::new(&self.api_key, self.timeout)?;
        Ok(match self.base_url {
            Some(ref url) => client.with_base_url(url),
            None => client,
        })
    }

    /// Single-turn chat completion with a system and a user message.
    pub async fn chat_completion(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Result<ChatCompletion> {
        let mut request = types::ChatRequest::new(&self.model)
            .message(types::WireMessage::system(system))
            .message(types::WireMessage::user(user));

        if types::uses_max_completion_tokens(&self.model) {
            request = request.max_completion_tokens(self.max_tokens);
        } else {
            request = request
                .max_tokens(self.max_tokens)
                .temperature(self.temperature);
        }

        let response = self.client()?.chat(&request).await?;
        let model = response.model.unwrap_or_else(|| self.model.clone());
        let usage = response.usage;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(AiError::EmptyResponse)?;

        Ok(ChatCompletion {
            content,
            model,
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_openai_new() {
        let ai = OpenAi::new("sk-test", "gpt-4o");
        assert_eq!(ai.model, "gpt-4o");
        assert_eq!(ai.api_key, "sk-test");
    }

    #[test]
    fn test_openai_with_base_url() {
        let ai = OpenAi::new("sk-test", "gpt-4o").with_base_url("https://custom.api.com");
        assert_eq!(ai.base_url, Some("https://custom.api.com".to_string()));
    }

    #[tokio::test]
    async fn chat_completion_returns_content_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "gpt-4o-mini", "max_tokens": 256})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "gpt-4o-mini-2024-07-18",
                "choices": [{"message": {"role": "assistant", "content": "## Themes"}}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}
            })))
            .mount(&server)
            .await;

        let ai = OpenAi::new("sk-test", "gpt-4o-mini")
            .with_base_url(server.uri())
            .with_max_tokens(256);
        let out = ai.chat_completion("sys", "user").await.unwrap();

        assert_eq!(out.content, "## Themes");
        assert_eq!(out.model, "gpt-4o-mini-2024-07-18");
        assert_eq!(out.usage.unwrap().total_tokens, 13);
    }

    #[tokio::test]
    async fn blank_content_is_an_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "  "}}]
            })))
            .mount(&server)
            .await;

        let ai = OpenAi::new("sk-test", "gpt-4o-mini").with_base_url(server.uri());
        let err = ai.chat_completion("sys", "user").await.unwrap_err();
        assert!(matches!(err, AiError::EmptyResponse));
    }

    #[tokio::test]
    async fn unauthorized_is_an_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Incorrect API key provided", "code": "invalid_api_key"}
            })))
            .mount(&server)
            .await;

        let ai = OpenAi::new("sk-bad", "gpt-4o-mini").with_base_url(server.uri());
        let err = ai.chat_completion("sys", "user").await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.code(), Some("invalid_api_key"));
    }
}
