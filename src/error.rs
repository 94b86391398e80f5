//! Error taxonomy shared across subsystems.
//!
//! Upstream errors surface to clients as gateway responses (see
//! `http::response`). Persistence errors never reach clients. Configuration
//! errors live in `config::loader` and are fatal at startup.

use std::path::PathBuf;
use std::time::Duration;

/// Failures on the relay path, each mapped to a distinct gateway status.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// No connection could be established after the configured retries.
    #[error("upstream {target} unreachable after {attempts} attempt(s): {reason}")]
    UpstreamUnreachable {
        target: String,
        attempts: u32,
        reason: String,
    },

    /// A connection exists but the upstream did not answer in time.
    #[error("upstream {target} sent nothing for {waited:?}")]
    UpstreamTimeout { target: String, waited: Duration },

    /// Every pooled connection slot for the target stayed busy.
    #[error("connection pool for {target} is saturated")]
    PoolSaturated { target: String, retry_after: Duration },
}

impl RelayError {
    /// Short machine-readable kind, used in responses and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::UpstreamUnreachable { .. } => "upstream_unreachable",
            RelayError::UpstreamTimeout { .. } => "upstream_timeout",
            RelayError::PoolSaturated { .. } => "pool_saturated",
        }
    }

    /// Whether this outcome counts against upstream health. Saturation is
    /// local backpressure, not an upstream failure.
    pub fn is_upstream_failure(&self) -> bool {
        !matches!(self, RelayError::PoolSaturated { .. })
    }
}

/// A snapshot could not be made durable.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to write snapshot {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize sessions: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("persistence disabled: {0}")]
    Disabled(String),
}

/// The on-disk snapshot could not be loaded at startup.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt snapshot {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
