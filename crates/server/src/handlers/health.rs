//! Health endpoint.

use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Report liveness of the server and its backends.
///
/// Unauthenticated so load balancers can probe it.
pub async fn health(State(state): State<AppState>) -> Response {
    let storage_ok = state.storage.health_check().await.is_ok();
    let metadata_ok = state.metadata.health_check().await.is_ok();

    let status = if storage_ok && metadata_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = json!({
        "status": if status == StatusCode::OK { "ok" } else { "degraded" },
        "storage": if storage_ok { "ok" } else { "unavailable" },
        "metadata": if metadata_ok { "ok" } else { "unavailable" },
    });
    (status, Json(body)).into_response()
}
