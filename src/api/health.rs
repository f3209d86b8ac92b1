use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tracing::warn;

use super::AppState;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Ready once the database answers; reports the current change cursor.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match state.ledger.repo().current_cursor().await {
        Ok(cursor) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "ready", "cursor": cursor})),
        ),
        Err(err) => {
            warn!(error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({"status": "unavailable"})),
            )
        }
    }
}
