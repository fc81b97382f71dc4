// Shared HTTP plumbing: client construction and status classification.

use std::time::Duration;

use chrono::Utc;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Response, StatusCode};

use crate::error::{ClientError, Result};

const MAX_ERROR_BODY_CHARS: usize = 300;

/// Build the shared HTTP client. Every request made through it is bounded by `timeout`.
pub(crate) fn build_http_client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))
}

/// Read a successful response as JSON, or classify the failure.
pub(crate) async fn read_json(resp: Response) -> Result<serde_json::Value> {
    let resp = check_status(resp).await?;
    Ok(resp.json().await?)
}

/// Read a successful response as raw bytes, or classify the failure.
pub(crate) async fn read_bytes(resp: Response) -> Result<Vec<u8>> {
    let resp = check_status(resp).await?;
    Ok(resp.bytes().await?.to_vec())
}

async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let headers = resp.headers().clone();
    let body = resp.text().await.unwrap_or_default();
    Err(classify(status, &headers, &body))
}

/// Map a non-success response to a `ClientError`.
pub(crate) fn classify(status: StatusCode, headers: &HeaderMap, body: &str) -> ClientError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return ClientError::RateLimited {
            retry_after: retry_after(headers),
        };
    }

    // GitHub signals exhausted quota with 403 plus rate-limit headers.
    if status == StatusCode::FORBIDDEN {
        let exhausted = headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim() == "0");
        if exhausted || headers.contains_key(RETRY_AFTER) {
            return ClientError::RateLimited {
                retry_after: retry_after(headers),
            };
        }
    }

    ClientError::Api {
        status: status.as_u16(),
        message: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
    }
}

/// `Retry-After` seconds, else `x-ratelimit-reset` epoch seconds relative to now.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if let Some(secs) = header_str(RETRY_AFTER.as_str()).and_then(|v| v.trim().parse::<u64>().ok()) {
        return Some(Duration::from_secs(secs));
    }

    let reset = header_str("x-ratelimit-reset")?.trim().parse::<i64>().ok()?;
    let wait = reset - Utc::now().timestamp();
    Some(Duration::from_secs(wait.max(0) as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn too_many_requests_reads_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        let err = classify(StatusCode::TOO_MANY_REQUESTS, &headers, "");
        assert_eq!(err.retry_after(), Some(Duration::from_secs(12)));
    }

    #[test]
    fn forbidden_with_exhausted_quota_is_rate_limited() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        let err = classify(StatusCode::FORBIDDEN, &headers, "API rate limit exceeded");
        assert!(matches!(err, ClientError::RateLimited { .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn plain_forbidden_is_an_api_error() {
        let err = classify(StatusCode::FORBIDDEN, &HeaderMap::new(), "nope");
        assert!(matches!(err, ClientError::Api { status: 403, .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn error_body_is_capped() {
        let body = "x".repeat(5000);
        match classify(StatusCode::BAD_GATEWAY, &HeaderMap::new(), &body) {
            ClientError::Api { message, status } => {
                assert_eq!(status, 502);
                assert_eq!(message.len(), MAX_ERROR_BODY_CHARS);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
