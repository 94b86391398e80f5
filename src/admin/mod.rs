//! Authenticated admin API.
//!
//! Mounted only when `admin.enabled` is set; every route requires
//! `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use axum::routing::{delete, get, post};
use axum::{middleware, Router};

use crate::http::server::AppState;
use self::auth::admin_auth_middleware;
use self::handlers::{close_session, get_sessions, get_status, run_sweep};

pub fn setup_admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/sessions", get(get_sessions))
        .route("/admin/sessions/{key}", delete(close_session))
        .route("/admin/sweep", post(run_sweep))
        .layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
