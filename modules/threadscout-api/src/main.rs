use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tracing::info;

use threadscout_common::Config;
use threadscout_scout::SessionRegistry;

mod rest;

pub struct AppState {
    pub registry: SessionRegistry,
    pub config: Config,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        // Catalogues
        .route("/api/platforms", get(rest::api_platforms))
        .route("/api/keywords", get(rest::api_keywords))
        // Sessions
        .route(
            "/api/sessions",
            get(rest::sessions::api_list_sessions).post(rest::sessions::api_start_session),
        )
        .route(
            "/api/sessions/{id}",
            get(rest::sessions::api_session_status).delete(rest::sessions::api_delete_session),
        )
        .route("/api/sessions/{id}/cancel", post(rest::sessions::api_cancel_session))
        .route("/api/sessions/{id}/results", get(rest::sessions::api_session_results))
        .route(
            "/api/sessions/{id}/analysis",
            get(rest::sessions::api_get_analysis).post(rest::sessions::api_request_analysis),
        )
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        // method + path + status + latency
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(threadscout_scout::log_filter()?)
        .init();

    let config = Config::from_env()?;
    config.log_redacted();

    let registry = SessionRegistry::from_config(&config)?;
    let addr = format!("{}:{}", config.web_host, config.web_port);
    let state = Arc::new(AppState { registry, config });

    let app = router(state);

    info!("ThreadScout API starting on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
