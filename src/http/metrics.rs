//! Reporting endpoints over the metrics sink.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::http::{AppState, sink_error};

/// GET /api/metrics
pub async fn overview(State(state): State<AppState>) -> Response {
    match state.sink.metrics().await {
        Ok(metrics) => Json(metrics).into_response(),
        Err(e) => sink_error(e),
    }
}

/// GET /api/metrics/success-rate — trailing 30 days.
pub async fn success_rate(State(state): State<AppState>) -> Response {
    match state.sink.success_rate(30).await {
        Ok(rate) => Json(serde_json::json!({
            "success_rate": rate,
            "window_days": 30,
        }))
        .into_response(),
        Err(e) => sink_error(e),
    }
}
