//! Agent endpoints — liveness listing and external heartbeats.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use crate::http::{AppState, sink_error};
use crate::sink::AgentStatusRow;

/// Heartbeats older than this are considered dead.
const ACTIVE_WINDOW_SECS: i64 = 300;

#[derive(Debug, Deserialize)]
pub struct HeartbeatBody {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub task_title: Option<String>,
    pub status: String,
    #[serde(default)]
    pub resource_usage: Option<serde_json::Value>,
}

/// GET /api/agents — agents that heartbeated within the last 5 minutes.
pub async fn list(State(state): State<AppState>) -> Response {
    match state.sink.active_agents(ACTIVE_WINDOW_SECS).await {
        Ok(agents) => Json(serde_json::json!({
            "count": agents.len(),
            "agents": agents,
        }))
        .into_response(),
        Err(e) => sink_error(e),
    }
}

/// POST /api/agents/{name}/heartbeat — upsert keyed by agent name.
///
/// `started_at` of an existing row is preserved by the sink; the value
/// sent here only seeds first registration.
pub async fn heartbeat(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<HeartbeatBody>,
) -> Response {
    let now = Utc::now();
    let row = AgentStatusRow {
        agent_id: name.clone(),
        name,
        current_task_id: body.task_id,
        current_task_title: body.task_title,
        status: body.status,
        started_at: now,
        last_heartbeat: now,
        resource_usage: body.resource_usage.unwrap_or_else(|| serde_json::json!({})),
    };
    match state.sink.upsert_agent(&row).await {
        Ok(()) => Json(serde_json::json!({"status": "ok"})).into_response(),
        Err(e) => sink_error(e),
    }
}
