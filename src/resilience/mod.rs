//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Relayed request:
//!     → timeouts.rs (one deadline for pool wait + dial + response head)
//!     → Dial failure: retries.rs (bounded attempts, backoff.rs delays)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Only connection establishment is retried, never a sent request
//! - Backoff is exponential, capped, jittered and non-decreasing

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use retries::{RetryExhausted, RetryPolicy};
pub use timeouts::{Deadline, DeadlineExceeded};
