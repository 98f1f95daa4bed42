use axum::extract::State;
use axum::Json;
use serde_json::json;

use super::AppState;

/// Returns process health as JSON. Always 200 while the process serves.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "active_transactions": state.coordinator.stats().active,
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}
