use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::health::HealthStatus;
use crate::http::server::AppState;
use crate::store::{SessionRecord, SessionSweeper, StoreSummary};
use crate::upstream::TargetStats;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
    pub health: HealthStatus,
    pub persistent: bool,
    pub sessions: StoreSummary,
    pub targets: Vec<TargetStats>,
}

#[derive(Serialize)]
pub struct SessionView {
    pub key: String,
    #[serde(flatten)]
    pub record: SessionRecord,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let relay = &state.relay;
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        started_at: state.started_at,
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        health: relay.health().status().as_ref().clone(),
        persistent: relay.store().is_persistent(),
        sessions: relay.store().summary(),
        targets: relay.connector().stats(),
    })
}

pub async fn get_sessions(State(state): State<AppState>) -> Json<Vec<SessionView>> {
    let sessions = state
        .relay
        .store()
        .list()
        .into_iter()
        .map(|(key, record)| SessionView { key, record })
        .collect();
    Json(sessions)
}

pub async fn close_session(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    match state.relay.store().close(&key).await {
        Ok(true) => {
            tracing::info!(session = %key, "Session closed by admin");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "session_not_found", "key": key })),
        )
            .into_response(),
        Err(e) => persistence_failure(e),
    }
}

pub async fn run_sweep(State(state): State<AppState>) -> Response {
    let sweeper = SessionSweeper::new(state.relay.store().clone(), state.config.store.clone());
    Json(sweeper.run_once().await).into_response()
}

fn persistence_failure(error: crate::error::PersistenceError) -> Response {
    tracing::error!(error = %error, "Admin operation could not persist");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": "persistence_error", "detail": error.to_string() })),
    )
        .into_response()
}
