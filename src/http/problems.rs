//! Problem endpoints — scanning, listing, and resolution.

use std::collections::HashMap;
use std::path::PathBuf;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ScanError;
use crate::http::{AppState, error_response, sink_error};

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub scan_path: PathBuf,
    /// Synthesize tasks for this scan even when yolo mode is off.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub resolution: String,
    pub resolved_by: String,
}

/// POST /api/problems/scan
///
/// Yolo mode comes from the startup env, a `yolo_mode` override stored
/// via PUT /api/config, or the request's `force` flag.
pub async fn scan(State(state): State<AppState>, Json(req): Json<ScanRequest>) -> Response {
    let stored_yolo = match state.sink.get_config("yolo_mode").await {
        Ok(entry) => entry.is_some_and(|e| e.value == "true"),
        Err(e) => {
            debug!(error = %e, "Could not read yolo_mode override");
            false
        }
    };
    let yolo = state.yolo_mode || stored_yolo || req.force;
    match state.scanner.scan(&req.scan_path, yolo).await {
        Ok(report) => {
            info!(
                path = %req.scan_path.display(),
                problems = report.problems_found,
                tasks = report.tasks_created,
                "Scan requested via API"
            );
            Json(report).into_response()
        }
        Err(e @ ScanError::RootMissing(_)) => {
            error_response(StatusCode::BAD_REQUEST, "bad_request", e.to_string())
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "scan_error", e.to_string()),
    }
}

/// GET /api/problems?filter=<all|active|critical|resolved>
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let filter = params.get("filter").map(String::as_str).unwrap_or("all");
    match state.sink.list_problems(filter).await {
        Ok(problems) => Json(serde_json::json!({
            "count": problems.len(),
            "problems": problems,
        }))
        .into_response(),
        Err(e) => sink_error(e),
    }
}

/// GET /api/problems/{id}
pub async fn get_one(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.sink.get_problem(&id).await {
        Ok(Some(problem)) => Json(problem).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("problem not found: {id}"),
        ),
        Err(e) => sink_error(e),
    }
}

/// PUT /api/problems/{id}/resolve
pub async fn resolve(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ResolveRequest>,
) -> Response {
    match state
        .sink
        .resolve_problem(&id, &req.resolution, &req.resolved_by)
        .await
    {
        Ok(problem) => Json(problem).into_response(),
        Err(e) => sink_error(e),
    }
}
