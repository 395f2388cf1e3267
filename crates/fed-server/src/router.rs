//! Router configuration.
//!
//! This module creates the main Axum router that combines all endpoints.

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::saml::saml_router;
use crate::state::AppState;

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    let health = Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness_check))
        .route("/health/ready", get(readiness_check));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(saml_router())
        .merge(health)
        .route("/", get(root))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

/// Server information response.
#[derive(Serialize)]
pub struct ServerInfo {
    name: String,
    version: String,
    entity_id: String,
    partners: usize,
    active_logouts: usize,
    assurance_levels: Vec<LevelInfo>,
    adapters: Vec<AdapterInfo>,
}

/// One row of the assurance level table.
#[derive(Serialize)]
pub struct LevelInfo {
    level: i32,
    uri: String,
}

/// A configured authentication adapter.
#[derive(Serialize)]
pub struct AdapterInfo {
    name: String,
    kind: &'static str,
    level: i32,
}

/// Root endpoint handler.
async fn root(State(state): State<AppState>) -> Json<ServerInfo> {
    Json(ServerInfo {
        name: "fed-server".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        entity_id: state.config.server.entity_id.clone(),
        partners: state.metadata.configured_partners().count(),
        active_logouts: state.orchestrator.active_sagas(),
        assurance_levels: state
            .levels
            .entries()
            .iter()
            .map(|entry| LevelInfo {
                level: entry.level,
                uri: entry.uri.clone(),
            })
            .collect(),
        adapters: state
            .adapters
            .instances()
            .iter()
            .map(|adapter| AdapterInfo {
                name: adapter.name.clone(),
                kind: adapter.kind,
                level: adapter.level,
            })
            .collect(),
    })
}

/// Basic health check.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
    })
}

/// Liveness probe.
async fn liveness_check() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe. Services are built before the listener opens, so a
/// server that answers is ready.
async fn readiness_check() -> StatusCode {
    StatusCode::OK
}
