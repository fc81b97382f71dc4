pub mod sessions;

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::warn;

use threadscout_common::{default_topics, AnalysisError, Config, Platform, ThreadScoutError};

use crate::AppState;

// --- Catalogues ---

#[derive(Debug, Serialize)]
pub struct PlatformInfo {
    pub platform: Platform,
    pub name: &'static str,
    /// Whether a credential is needed before any search can run.
    pub requires_auth: bool,
    /// Environment variable holding the credential, if the platform takes one.
    pub credential: Option<&'static str>,
    pub credential_set: bool,
    pub ready: bool,
}

pub fn platform_catalog(config: &Config) -> Vec<PlatformInfo> {
    Platform::ALL
        .iter()
        .map(|&platform| {
            let (requires_auth, credential, credential_set) = match platform {
                Platform::Github => (
                    config.github.requires_token(),
                    Some("GITHUB_TOKEN"),
                    config.github.token.is_some(),
                ),
                Platform::StackOverflow => {
                    (false, Some("STACKEXCHANGE_KEY"), config.stackoverflow.key.is_some())
                }
                Platform::Reddit | Platform::HackerNews | Platform::Arxiv => (false, None, false),
            };
            PlatformInfo {
                platform,
                name: platform.display_name(),
                requires_auth,
                credential,
                credential_set,
                ready: !requires_auth || credential_set,
            }
        })
        .collect()
}

pub async fn api_platforms(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "platforms": platform_catalog(&state.config),
        "analysis_available": state.registry.analysis_configured(),
    }))
}

pub async fn api_keywords() -> impl IntoResponse {
    Json(serde_json::json!({ "topics": default_topics() }))
}

// --- Errors ---

fn error_json(status: StatusCode, message: String, kind: Option<&str>) -> Response {
    let body = match kind {
        Some(kind) => serde_json::json!({"error": message, "kind": kind}),
        None => serde_json::json!({"error": message}),
    };
    (status, Json(body)).into_response()
}

fn analysis_status(err: &AnalysisError) -> StatusCode {
    match err {
        AnalysisError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
        AnalysisError::NoRecords => StatusCode::UNPROCESSABLE_ENTITY,
        AnalysisError::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
        AnalysisError::Transient { .. } => StatusCode::SERVICE_UNAVAILABLE,
        AnalysisError::Auth(_)
        | AnalysisError::Rejected { .. }
        | AnalysisError::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
    }
}

/// Map a domain error onto a status code and `{"error": ...}` body.
pub fn error_response(err: ThreadScoutError) -> Response {
    match &err {
        ThreadScoutError::Validation(_) => error_json(StatusCode::BAD_REQUEST, err.to_string(), None),
        ThreadScoutError::SessionNotFound(_) => {
            error_json(StatusCode::NOT_FOUND, err.to_string(), None)
        }
        ThreadScoutError::SessionNotFinished(_) => {
            error_json(StatusCode::CONFLICT, err.to_string(), None)
        }
        ThreadScoutError::Analysis(a) => {
            error_json(analysis_status(a), err.to_string(), Some(a.kind()))
        }
        ThreadScoutError::Config(_) | ThreadScoutError::Anyhow(_) => {
            warn!(error = %err, "Request failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, err.to_string(), None)
        }
    }
}
