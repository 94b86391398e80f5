//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (axum::serve, HTTP/1.1)
//!     → request.rs (request ID, outermost layer)
//!     → server.rs (TraceLayer span, route dispatch)
//!         /health       → health.rs
//!         /admin/*      → admin (when enabled)
//!         anything else → relay::RelayEngine
//!     → response.rs (relay errors as gateway responses)
//!     → Send to client
//! ```

pub mod health;
pub mod request;
pub mod response;
pub mod server;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
