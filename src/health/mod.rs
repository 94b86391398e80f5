//! Health supervision subsystem.
//!
//! # Data Flow
//! ```text
//! Active probing (active.rs):
//!     Periodic timer
//!     → Probe each upstream target (short timeout)
//!     → supervisor.rs (probe round result)
//!
//! Passive checking (passive.rs):
//!     Relay outcome observed
//!     → Sliding window of consecutive failures
//!     → supervisor.rs (degrade when threshold reached)
//!
//! State machine (state.rs):
//!     starting → ready → degraded → ready | unready
//!
//! /health reads the published snapshot without locking.
//! ```
//!
//! # Design Decisions
//! - Probes run independently of relay traffic, so a slow upstream exchange
//!   cannot delay or mask a probe
//! - A store that failed to load keeps the process unready for good

pub mod active;
pub mod passive;
pub mod state;
pub mod supervisor;

pub use active::HealthMonitor;
pub use state::{HealthState, HealthStatus};
pub use supervisor::HealthSupervisor;
