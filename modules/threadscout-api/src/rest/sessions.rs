use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use threadscout_common::{Keyword, Platform, ThreadScoutError};
use threadscout_scout::relevance::sort_by_relevance;

use super::error_response;
use crate::AppState;

// --- Request structs ---

/// A keyword given either as a bare term or with its topic.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum KeywordInput {
    Term(String),
    Full(Keyword),
}

impl From<KeywordInput> for Keyword {
    fn from(input: KeywordInput) -> Self {
        match input {
            KeywordInput::Term(term) => Keyword::new(term),
            KeywordInput::Full(kw) => kw,
        }
    }
}

#[derive(Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    keywords: Vec<KeywordInput>,
    #[serde(default)]
    platforms: Vec<String>,
}

#[derive(Deserialize)]
pub struct ResultsQuery {
    sort: Option<String>,
    limit: Option<usize>,
}

#[derive(Deserialize, Default)]
pub struct AnalysisRequest {
    focus: Option<String>,
}

fn parse_platforms(names: &[String]) -> Result<Vec<Platform>, ThreadScoutError> {
    names.iter().map(|n| n.parse()).collect()
}

// --- Handlers ---

pub async fn api_start_session(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartRequest>,
) -> impl IntoResponse {
    let platforms = match parse_platforms(&body.platforms) {
        Ok(p) => p,
        Err(e) => return error_response(e),
    };
    let keywords = body.keywords.into_iter().map(Keyword::from).collect();

    match state.registry.start(keywords, platforms) {
        Ok(handle) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "session_id": handle.id() })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn api_list_sessions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({ "sessions": state.registry.list() }))
}

pub async fn api_session_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.registry.status(id) {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn api_cancel_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.registry.cancel(id) {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn api_delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.registry.remove(id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn api_session_results(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<ResultsQuery>,
) -> impl IntoResponse {
    let records = match state.registry.results(id) {
        Ok(r) => r,
        Err(e) => return error_response(e),
    };

    let mut records = records.to_vec();
    match params.sort.as_deref() {
        None | Some("collected") => {}
        Some("relevance") => sort_by_relevance(&mut records),
        Some(other) => {
            return error_response(ThreadScoutError::Validation(format!(
                "unknown sort order: {other}"
            )))
        }
    }
    let total = records.len();
    if let Some(limit) = params.limit {
        records.truncate(limit);
    }

    Json(serde_json::json!({
        "session_id": id,
        "total": total,
        "records": records,
    }))
    .into_response()
}

pub async fn api_request_analysis(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    body: Option<Json<AnalysisRequest>>,
) -> impl IntoResponse {
    let Json(request) = body.unwrap_or_default();
    info!(session_id = %id, focus = request.focus.as_deref(), "Analysis requested");

    match state.registry.analyze(id, request.focus.as_deref()).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn api_get_analysis(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.registry.analysis(id) {
        Ok(Some(result)) => Json(result).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "No analysis has been produced for this session"})),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ai_client::AiError;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use serde_json::Value;
    use threadscout_common::config::{AnalysisSettings, RetryPolicy};
    use threadscout_common::{AnalysisError, Config, DiscussionRecord};
    use threadscout_scout::testing::{record, MockSearcher, MockSummarizer};
    use threadscout_scout::{Aggregator, Analyzer, SessionRegistry};
    use tower::ServiceExt;

    use super::*;
    use crate::{router, AppState};

    fn state(searcher: MockSearcher, summarizer: Option<MockSummarizer>) -> Arc<AppState> {
        let aggregator = Aggregator::new(Arc::new(searcher), RetryPolicy::none());
        let analyzer =
            summarizer.map(|s| Analyzer::new(Arc::new(s), &AnalysisSettings::default()));
        Arc::new(AppState {
            registry: SessionRegistry::new(aggregator, analyzer),
            config: Config::default(),
        })
    }

    async fn send(state: &Arc<AppState>, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    async fn start_and_wait(state: &Arc<AppState>, body: Value) -> Uuid {
        let (status, json) = send(state, Method::POST, "/api/sessions", Some(body)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let id: Uuid = json["session_id"].as_str().unwrap().parse().unwrap();
        state.registry.get(id).unwrap().wait().await;
        id
    }

    fn scored(id: &str, title: &str) -> DiscussionRecord {
        DiscussionRecord::new(Platform::Reddit, id, title, "", format!("https://reddit.test/{id}"))
            .unwrap()
    }

    #[tokio::test]
    async fn health_check() {
        let app = state(MockSearcher::new(), None);
        let response = router(app)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn platform_catalogue_reports_readiness() {
        let app = state(MockSearcher::new(), None);
        let (status, json) = send(&app, Method::GET, "/api/platforms", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["platforms"].as_array().unwrap().len(), 5);
        assert_eq!(json["analysis_available"], false);
        let github = &json["platforms"][1];
        assert_eq!(github["platform"], "github");
        assert_eq!(github["requires_auth"], false);
        assert_eq!(github["ready"], true);
    }

    #[tokio::test]
    async fn keyword_catalogue_lists_topics() {
        let app = state(MockSearcher::new(), None);
        let (status, json) = send(&app, Method::GET, "/api/keywords", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["topics"].as_array().unwrap().len(), 3);
        assert_eq!(json["topics"][0]["name"], "agent_connectivity");
        assert_eq!(json["topics"][0]["weight"], 2.0);
    }

    #[tokio::test]
    async fn start_session_and_read_status() {
        let searcher = MockSearcher::new()
            .on_page(Platform::Reddit, "mcp", vec![record(Platform::Reddit, "a")], false);
        let app = state(searcher, None);

        let id = start_and_wait(
            &app,
            serde_json::json!({"keywords": ["mcp", {"term": "MCP", "topic": "x"}], "platforms": ["reddit"]}),
        )
        .await;

        let (status, json) = send(&app, Method::GET, &format!("/api/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "completed");
        assert_eq!(json["total_records"], 1);
        assert_eq!(json["pairs"].as_array().unwrap().len(), 1);
        assert_eq!(json["progress_percent"], 100);

        let (_, list) = send(&app, Method::GET, "/api/sessions", None).await;
        assert_eq!(list["sessions"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_input_is_a_bad_request() {
        let app = state(MockSearcher::new(), None);

        let (status, json) = send(
            &app,
            Method::POST,
            "/api/sessions",
            Some(serde_json::json!({"keywords": ["mcp"], "platforms": ["myspace"]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("myspace"));

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/sessions",
            Some(serde_json::json!({"keywords": ["  "], "platforms": ["reddit"]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let app = state(MockSearcher::new(), None);
        let id = Uuid::new_v4();
        for uri in [
            format!("/api/sessions/{id}"),
            format!("/api/sessions/{id}/results"),
            format!("/api/sessions/{id}/analysis"),
        ] {
            let (status, json) = send(&app, Method::GET, &uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert!(json["error"].is_string());
        }
    }

    #[tokio::test]
    async fn results_conflict_until_terminal() {
        let searcher = MockSearcher::new()
            .with_latency(Duration::from_millis(200))
            .on_page(Platform::Reddit, "mcp", vec![record(Platform::Reddit, "a")], false);
        let app = state(searcher, None);

        let (_, json) = send(
            &app,
            Method::POST,
            "/api/sessions",
            Some(serde_json::json!({"keywords": ["mcp"], "platforms": ["reddit"]})),
        )
        .await;
        let id = json["session_id"].as_str().unwrap().to_string();

        let (status, _) = send(&app, Method::GET, &format!("/api/sessions/{id}/results"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn results_sort_by_relevance() {
        let searcher = MockSearcher::new().on_page(
            Platform::Reddit,
            "mcp",
            vec![scored("1", "unrelated"), scored("2", "MCP protocol problem")],
            false,
        );
        let app = state(searcher, None);
        let id = start_and_wait(
            &app,
            serde_json::json!({"keywords": ["mcp"], "platforms": ["reddit"]}),
        )
        .await;

        let (status, json) = send(
            &app,
            Method::GET,
            &format!("/api/sessions/{id}/results?sort=relevance&limit=1"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total"], 2);
        assert_eq!(json["records"].as_array().unwrap().len(), 1);
        assert_eq!(json["records"][0]["original_id"], "2");
    }

    #[tokio::test]
    async fn cancel_and_delete() {
        let searcher = MockSearcher::new().with_latency(Duration::from_millis(100));
        let app = state(searcher, None);
        let (_, json) = send(
            &app,
            Method::POST,
            "/api/sessions",
            Some(serde_json::json!({"keywords": ["a", "b"], "platforms": ["arxiv"]})),
        )
        .await;
        let id = json["session_id"].as_str().unwrap().to_string();

        let (status, snap) = send(&app, Method::POST, &format!("/api/sessions/{id}/cancel"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snap["cancel_requested"], true);

        let (status, _) = send(&app, Method::DELETE, &format!("/api/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::GET, &format!("/api/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn analysis_is_produced_then_served() {
        let searcher = MockSearcher::new()
            .on_page(Platform::Reddit, "mcp", vec![record(Platform::Reddit, "a")], false);
        let app = state(searcher, Some(MockSummarizer::new().on_summary("## Themes")));
        let id = start_and_wait(
            &app,
            serde_json::json!({"keywords": ["mcp"], "platforms": ["reddit"]}),
        )
        .await;

        let uri = format!("/api/sessions/{id}/analysis");
        let (status, _) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, json) =
            send(&app, Method::POST, &uri, Some(serde_json::json!({"focus": "identity"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["summary"], "## Themes");

        let (status, json) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["summary"], "## Themes");
    }

    #[tokio::test]
    async fn analysis_errors_map_to_status_codes() {
        let searcher = MockSearcher::new()
            .on_page(Platform::Reddit, "mcp", vec![record(Platform::Reddit, "a")], false);
        let summarizer = MockSummarizer::new().on_error(ai_error_quota());
        let app = state(searcher, Some(summarizer));
        let id = start_and_wait(
            &app,
            serde_json::json!({"keywords": ["mcp"], "platforms": ["reddit"]}),
        )
        .await;

        let (status, json) =
            send(&app, Method::POST, &format!("/api/sessions/{id}/analysis"), None).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json["kind"], AnalysisError::QuotaExceeded(String::new()).kind());
    }

    #[tokio::test]
    async fn analysis_without_key_is_unavailable() {
        let app = state(MockSearcher::new(), None);
        let id = start_and_wait(
            &app,
            serde_json::json!({"keywords": ["mcp"], "platforms": ["reddit"]}),
        )
        .await;

        let (status, json) =
            send(&app, Method::POST, &format!("/api/sessions/{id}/analysis"), None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["kind"], "not_configured");
    }

    fn ai_error_quota() -> AiError {
        AiError::Api {
            status: 429,
            code: Some("insufficient_quota".into()),
            message: "You exceeded your current quota".into(),
        }
    }
}
