use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use threadscout_common::FailureKind;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rate limited{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// The provider's request quota for the day is spent. Retrying before
    /// the reset only burns more calls.
    #[error("Request quota exhausted until {resets_at}")]
    QuotaExhausted { resets_at: DateTime<Utc> },

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(" (retry after {}s)", d.as_secs()))
        .unwrap_or_default()
}

impl ClientError {
    /// Failures worth retrying with backoff: rate limits, timeouts,
    /// connection errors and 5xx responses.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::RateLimited { .. } | ClientError::Timeout | ClientError::Network(_) => {
                true
            }
            ClientError::Api { status, .. } => *status >= 500,
            ClientError::Config(_) | ClientError::Parse(_) | ClientError::QuotaExhausted { .. } => {
                false
            }
        }
    }

    /// Provider-supplied wait before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ClientError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            ClientError::Config(_) => FailureKind::Configuration,
            ClientError::RateLimited { .. } | ClientError::QuotaExhausted { .. } => {
                FailureKind::RateLimited
            }
            ClientError::Timeout => FailureKind::Timeout,
            ClientError::Network(_) => FailureKind::Network,
            ClientError::Api { .. } => FailureKind::Http,
            ClientError::Parse(_) => FailureKind::Parse,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_decode() {
            ClientError::Parse(err.to_string())
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient_client_errors_are_not() {
        let e503 = ClientError::Api {
            status: 503,
            message: String::new(),
        };
        let e404 = ClientError::Api {
            status: 404,
            message: String::new(),
        };
        assert!(e503.is_transient());
        assert!(!e404.is_transient());
        assert!(!ClientError::Config("no token".into()).is_transient());
        assert!(ClientError::Timeout.is_transient());
    }

    #[test]
    fn exhausted_quota_is_rate_limited_but_not_retried() {
        let err = ClientError::QuotaExhausted {
            resets_at: DateTime::from_timestamp(1_714_608_000, 0).unwrap(),
        };
        assert!(!err.is_transient());
        assert_eq!(err.kind(), FailureKind::RateLimited);
        assert!(err.to_string().starts_with("Request quota exhausted until 2024-05-02"));
    }

    #[test]
    fn rate_limit_message_includes_hint() {
        let err = ClientError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(err.to_string(), "Rate limited (retry after 30s)");
        assert_eq!(
            ClientError::RateLimited { retry_after: None }.to_string(),
            "Rate limited"
        );
    }
}
