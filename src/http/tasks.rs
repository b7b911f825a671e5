//! Task endpoints — CRUD, staging, analysis, and ad-hoc scoring.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::{error, info};

use crate::http::{AppState, error_response, store_error};
use crate::priority;
use crate::store::task::PriorityEstimates;
use crate::store::{Task, TaskFolder, TaskPatch};

/// Incoming task draft. Everything but the title is optional.
#[derive(Debug, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub task_type: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub priority: PriorityEstimates,
    #[serde(default)]
    pub created_by: Option<String>,
}

/// GET /api/tasks?status=<all|active|staged|backlog|completed|failed>
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let filter = params.get("status").map(String::as_str).unwrap_or("all");
    match state.store.list(filter).await {
        Ok(tasks) => Json(serde_json::json!({
            "count": tasks.len(),
            "tasks": tasks,
        }))
        .into_response(),
        Err(e) => store_error(e),
    }
}

/// POST /api/tasks — persist a draft into the backlog.
pub async fn create(State(state): State<AppState>, Json(draft): Json<TaskDraft>) -> Response {
    if draft.title.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "bad_request", "title is required");
    }

    let created_by = draft.created_by.unwrap_or_else(|| "api".to_string());
    let mut task = Task::new(draft.title, created_by)
        .with_description(draft.description)
        .with_estimates(draft.priority);
    task.task_type = draft.task_type;
    task.target = draft.target;
    task.notes = draft.notes;

    match state.store.create(task).await {
        Ok(task) => {
            info!(task_id = %task.id, "Task created via API");
            (StatusCode::CREATED, Json(task)).into_response()
        }
        Err(e) => store_error(e),
    }
}

/// PUT /api/tasks/{id} — merge a whitelisted patch.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<TaskPatch>,
) -> Response {
    match state.store.update(&id, &patch).await {
        Ok(task) => Json(task).into_response(),
        Err(e) => store_error(e),
    }
}

/// DELETE /api/tasks/{id}
pub async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.delete(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => store_error(e),
    }
}

/// POST /api/tasks/{id}/execute — promote a backlog task to `staged/`
/// and wake the swarm; the pool claims it through the normal path.
pub async fn execute(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let folder = match state.store.find(&id).await {
        Ok(folder) => folder,
        Err(e) => return store_error(e),
    };

    match folder {
        TaskFolder::BacklogManual | TaskFolder::BacklogGenerated => {
            if let Err(e) = state.store.transition(&id, folder, TaskFolder::Staged).await {
                return store_error(e);
            }
        }
        // Already waiting to be claimed; just nudge the pool again.
        TaskFolder::Staged => {}
        other => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "bad_request",
                format!("task is {}, only backlog tasks can be staged", other.status_label()),
            );
        }
    }

    state.staged_wakeup.notify_waiters();
    info!(task_id = %id, "Task staged for execution");
    Json(serde_json::json!({"id": id, "status": "staged"})).into_response()
}

/// POST /api/tasks/{id}/analyze — kick off analysis asynchronously.
pub async fn analyze(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if let Err(e) = state.store.find(&id).await {
        return store_error(e);
    }

    let analyzer = state.analyzer.clone();
    let task_id = id.clone();
    tokio::spawn(async move {
        if let Err(e) = analyzer.analyze(&task_id).await {
            error!(task_id = %task_id, error = %e, "Background analysis failed");
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({"id": id, "status": "analysis_started"})),
    )
        .into_response()
}

/// POST /api/calculate-priority — score a set of estimates without
/// touching any task.
pub async fn calculate_priority(
    State(state): State<AppState>,
    Json(estimates): Json<PriorityEstimates>,
) -> Response {
    let weights = state.weights.snapshot();
    let score = priority::score(&estimates, &weights);
    Json(serde_json::json!({
        "priority_score": score,
        "weights_used": weights,
        "estimates_used": estimates,
    }))
    .into_response()
}
