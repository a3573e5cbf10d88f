//! HTTP API for the DocChat service.
//!
//! - Health and metrics
//! - Document upload and task status (polling and server-sent events)
//! - Chat against an indexed collection
//! - Collection listing and deletion

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::service::DocChatService;

pub mod chat;
pub mod collections;
pub mod documents;
use chat::chat_handler;
use collections::{delete_collection_handler, list_collections_handler};
use documents::{status_events_handler, status_handler, upload_handler};

/// Multipart framing on top of the file itself
pub(crate) const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Application state
pub struct AppState {
    pub service: Arc<DocChatService>,
    pub metrics: Option<PrometheusHandle>,
}

/// Build the API router
pub fn router(service: Arc<DocChatService>, metrics: Option<PrometheusHandle>) -> Router {
    let max_body_size = (service.config.limits.max_document_size_bytes as usize)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    let state = Arc::new(AppState { service, metrics });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route(
            "/upload",
            post(upload_handler).layer(DefaultBodyLimit::max(max_body_size)),
        )
        .route("/status/{task_id}", get(status_handler))
        .route("/status/{task_id}/events", get(status_events_handler))
        .route("/chat", post(chat_handler))
        .route("/collections", get(list_collections_handler))
        .route("/collections/{name}", delete(delete_collection_handler));

    Router::new()
        .route("/", get(health_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .nest("/api", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// === Health & Metrics ===

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let llm_available = state.service.llm_available().await;

    Json(HealthResponse {
        status: if llm_available { "ok" } else { "degraded" },
        message: "Welcome to the DocChat API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.service.started_at.elapsed().as_secs(),
        llm_available,
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    message: String,
    version: String,
    uptime_seconds: u64,
    llm_available: bool,
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics exporter not installed").into_response(),
    }
}
