//! Relay engine subsystem.
//!
//! # Data Flow
//! ```text
//! Client request
//!     → identity.rs (session header / Authorization digest / peer IP)
//!     → engine.rs: StateStore::update (create or touch the session)
//!     → engine.rs: rewrite headers and URI for the upstream
//!     → UpstreamConnector::connect + forward (one request deadline)
//!     → response streamed back; outcome reported to HealthSupervisor
//! ```
//!
//! # Design Decisions
//! - Exactly one scheduler owns the pool and the session cache; a second
//!   worker process would split both and break session affinity
//! - Session writes are best-effort; relay correctness is not

pub mod engine;
pub mod identity;

pub use engine::RelayEngine;
pub use identity::{ClientIdentity, IdentityResolver, IdentitySource};
