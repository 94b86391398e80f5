//! Upstream connector subsystem.
//!
//! # Data Flow
//! ```text
//! Relay needs a target for a session
//!     → connector.rs (assign new sessions via round_robin.rs / least_conn.rs)
//!     → pool.rs (wait for a slot, reuse an idle connection)
//!     → connector.rs (otherwise dial with retries + backoff)
//!     → forward: response head within keep-alive window
//!     → body.rs (body streamed chunk by chunk, handle released at the end)
//! ```
//!
//! # Design Decisions
//! - One pool per target; HTTP/1.1 only, connections reused sequentially
//! - Unreachable targets are skipped when assigning new sessions
//! - Only dials are retried; a request already sent is never replayed,
//!   except when a stale pooled connection hands it back unsent

pub mod body;
pub mod connector;
pub mod least_conn;
pub mod pool;
pub mod round_robin;
pub mod target;

use std::sync::Arc;

pub use connector::{TargetStats, UpstreamConnector};
pub use pool::{TargetHealth, TargetPool, UpstreamHandle};
pub use target::{TargetError, UpstreamTarget};

/// Strategy for placing new sessions on a target.
pub trait TargetSelector: Send + Sync + std::fmt::Debug {
    /// `None` when no target is currently usable.
    fn select(&self, pools: &[Arc<TargetPool>]) -> Option<Arc<TargetPool>>;
}
