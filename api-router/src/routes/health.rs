use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use common::storage::db::ConnectionState;
use serde_json::json;

use crate::api_state::ApiState;

/// Liveness probe: the process is up and serving requests.
pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// Readiness probe: returns 200 if the record store and blob store both
/// answer, else 503.
pub async fn ready(State(state): State<ApiState>) -> impl IntoResponse {
    let connection = state.db.probe().await;
    let storage = state
        .storage
        .check_available(&state.config.pdf_namespace)
        .await;

    let db_check = if connection == ConnectionState::Connected {
        "ok"
    } else {
        "fail"
    };

    match storage {
        Ok(()) if connection == ConnectionState::Connected => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "connection": connection,
                "checks": { "db": db_check, "storage": "ok" }
            })),
        ),
        Ok(()) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "error",
                "connection": connection,
                "checks": { "db": db_check, "storage": "ok" }
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "error",
                "connection": connection,
                "checks": { "db": db_check, "storage": "fail" },
                "reason": e.to_string()
            })),
        ),
    }
}
