//! `GET /health`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::http::server::AppState;

/// 200 while ready or degraded, 503 while starting or unready.
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.relay.health().status();
    let code = if status.state.is_serving() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status.as_ref().clone()))
}
