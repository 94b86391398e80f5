//! Error responses.
//!
//! # Responsibilities
//! - Map relay errors to gateway status codes
//! - Render a small JSON body naming the error kind
//!
//! # Design Decisions
//! - Unreachable → 502, slow → 504, saturated → 503 + Retry-After, so
//!   clients can tell "down" from "slow" from "busy"
//! - Never expose internal error chains beyond the one-line message

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::RelayError;

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    detail: String,
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::UpstreamUnreachable { .. } => StatusCode::BAD_GATEWAY,
            RelayError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            RelayError::PoolSaturated { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.kind(),
            detail: self.to_string(),
        };
        let mut response = (status, Json(body)).into_response();

        if let RelayError::PoolSaturated { retry_after, .. } = &self {
            let secs = retry_after.as_secs().max(1);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
