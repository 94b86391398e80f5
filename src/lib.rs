//! Session relay library.
//!
//! An HTTP reverse proxy that binds each client identity to an upstream
//! target, keeps session records in a JSON snapshot on disk, and reports
//! readiness on `/health`.

pub mod admin;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod relay;
pub mod resilience;
pub mod security;
pub mod store;
pub mod upstream;

pub use config::schema::RelayConfig;
pub use error::{PersistenceError, RelayError, StoreError};
pub use http::HttpServer;
pub use lifecycle::{RelayService, Shutdown};
