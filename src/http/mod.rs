//! HTTP front door — a thin axum translation layer over the core.
//!
//! Handlers validate, call into the domain, and shape JSON. No business
//! logic lives here. Error bodies are `{error, message, code}`.

pub mod agents;
pub mod config;
pub mod metrics;
pub mod problems;
pub mod tasks;

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use tokio::sync::Notify;
use tower_http::cors::CorsLayer;

use crate::analyzer::TaskAnalyzer;
use crate::error::{SinkError, StoreError};
use crate::priority::WeightsHandle;
use crate::problems::ProblemScanner;
use crate::sink::MetricsSink;
use crate::store::TaskStore;

/// Shared state for all API routes.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TaskStore>,
    pub sink: Arc<dyn MetricsSink>,
    pub analyzer: Arc<TaskAnalyzer>,
    pub scanner: Arc<ProblemScanner>,
    pub weights: Arc<WeightsHandle>,
    /// Authoritative priority weights file; updates are written here and
    /// mirrored to the sink.
    pub weights_path: PathBuf,
    /// Woken after anything lands in `staged/`.
    pub staged_wakeup: Arc<Notify>,
    pub yolo_mode: bool,
}

/// Build the full API router.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/tasks", get(tasks::list).post(tasks::create))
        .route("/api/tasks/{id}", put(tasks::update).delete(tasks::remove))
        .route("/api/tasks/{id}/execute", post(tasks::execute))
        .route("/api/tasks/{id}/analyze", post(tasks::analyze))
        .route("/api/agents", get(agents::list))
        .route("/api/agents/{name}/heartbeat", post(agents::heartbeat))
        .route("/api/metrics", get(metrics::overview))
        .route("/api/metrics/success-rate", get(metrics::success_rate))
        .route("/api/config", get(config::get_all).put(config::update))
        .route("/api/problems/scan", post(problems::scan))
        .route("/api/problems", get(problems::list))
        .route("/api/problems/{id}", get(problems::get_one))
        .route("/api/problems/{id}/resolve", put(problems::resolve))
        .route("/api/calculate-priority", post(tasks::calculate_priority))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "task-swarm",
        "timestamp": Utc::now(),
    }))
}

// ── Error shaping ───────────────────────────────────────────────────

/// A `{error, message, code}` JSON error response.
pub(crate) fn error_response(
    status: StatusCode,
    error: &str,
    message: impl Into<String>,
) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": error,
            "message": message.into(),
            "code": status.as_u16(),
        })),
    )
        .into_response()
}

pub(crate) fn store_error(e: StoreError) -> Response {
    match e {
        StoreError::NotFound(id) => error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("Task not found: {id}"),
        ),
        other => error_response(StatusCode::INTERNAL_SERVER_ERROR, "store_error", other.to_string()),
    }
}

pub(crate) fn sink_error(e: SinkError) -> Response {
    match e {
        SinkError::NotFound { entity, id } => error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("{entity} not found: {id}"),
        ),
        other => error_response(StatusCode::INTERNAL_SERVER_ERROR, "sink_error", other.to_string()),
    }
}
