use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tracing::debug;

use super::types::*;
use crate::error::{AiError, Result};

pub(crate) const OPENAI_API_URL: &str = "https://api.openai.com/v1";
const MAX_ERROR_CHARS: usize = 500;

pub(crate) struct OpenAiClient {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AiError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            api_key: api_key.to_string(),
            http,
            base_url: OPENAI_API_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|_| AiError::Config("API key is not a valid header value".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %request.model, "OpenAI chat request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            return Err(api_error(status, &error_text));
        }

        Ok(response.json().await?)
    }
}

/// Build an `Api` error from a non-success body, keeping the provider's code when present.
pub(crate) fn api_error(status: u16, body: &str) -> AiError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => AiError::Api {
            status,
            code: env.error.code.or(env.error.error_type),
            message: env.error.message,
        },
        Err(_) => AiError::Api {
            status,
            code: None,
            message: body.chars().take(MAX_ERROR_CHARS).collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_error_body_keeps_code() {
        let err = api_error(
            429,
            r#"{"error":{"message":"quota","type":"insufficient_quota","code":null}}"#,
        );
        assert_eq!(err.status(), Some(429));
        assert_eq!(err.code(), Some("insufficient_quota"));
    }

    #[test]
    fn plain_error_body_is_truncated() {
        let err = api_error(502, &"x".repeat(2000));
        match err {
            AiError::Api { message, code, .. } => {
                assert_eq!(message.len(), MAX_ERROR_CHARS);
                assert!(code.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
