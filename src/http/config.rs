//! Tunable configuration endpoints — sink entries and priority weights.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::info;

use crate::http::{AppState, error_response, sink_error};
use crate::priority::PriorityWeights;
use crate::sink::ConfigEntry;

/// Partial weights update; absent fields keep their current value.
#[derive(Debug, Default, Deserialize)]
pub struct WeightsPatch {
    #[serde(default)]
    pub impact: Option<f64>,
    #[serde(default)]
    pub urgency: Option<f64>,
    #[serde(default)]
    pub success: Option<f64>,
    #[serde(default)]
    pub cost: Option<f64>,
}

impl WeightsPatch {
    fn apply(&self, mut weights: PriorityWeights) -> PriorityWeights {
        if let Some(impact) = self.impact {
            weights.impact = impact;
        }
        if let Some(urgency) = self.urgency {
            weights.urgency = urgency;
        }
        if let Some(success) = self.success {
            weights.success = success;
        }
        if let Some(cost) = self.cost {
            weights.cost = cost;
        }
        weights
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default)]
    pub entries: Vec<ConfigEntry>,
    #[serde(default)]
    pub priority_weights: Option<WeightsPatch>,
}

/// GET /api/config
pub async fn get_all(State(state): State<AppState>) -> Response {
    match state.sink.all_config().await {
        Ok(entries) => Json(serde_json::json!({
            "entries": entries,
            "priority_weights": state.weights.snapshot(),
        }))
        .into_response(),
        Err(e) => sink_error(e),
    }
}

/// PUT /api/config — partial update of entries and/or weights.
///
/// Weights are written to the authoritative YAML file first, then the
/// live snapshot and the sink mirror follow.
pub async fn update(State(state): State<AppState>, Json(body): Json<ConfigUpdate>) -> Response {
    for entry in &body.entries {
        if let Err(e) = state.sink.set_config(entry).await {
            return sink_error(e);
        }
    }

    if let Some(patch) = &body.priority_weights {
        let merged = patch.apply(state.weights.snapshot());
        let yaml = match serde_yaml::to_string(&merged) {
            Ok(yaml) => yaml,
            Err(e) => {
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "serialize_error",
                    e.to_string(),
                );
            }
        };
        if let Err(e) = tokio::fs::write(&state.weights_path, yaml).await {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "io_error",
                format!("failed to persist weights: {e}"),
            );
        }
        state.weights.replace(merged);
        for (weight_type, value) in [
            ("impact", merged.impact),
            ("urgency", merged.urgency),
            ("success", merged.success),
            ("cost", merged.cost),
        ] {
            if let Err(e) = state.sink.upsert_weight(weight_type, value).await {
                return sink_error(e);
            }
        }
        info!("Priority weights updated");
    }

    get_all(State(state)).await
}
