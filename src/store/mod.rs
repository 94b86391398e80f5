//! Session state subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     <data_dir>/<partition>.json → snapshot.rs (load, discard interrupted writes)
//!     → state_store.rs (in-memory cache)
//!
//! Relay path:
//!     update(key, f) → mutation lock → snapshot.rs (temp file + rename) → cache swap
//!
//! Background (sweeper.rs):
//!     mark idle → remove expired → purge closed → flush dirty cache
//! ```
//!
//! # Design Decisions
//! - The file on disk is the source of truth at startup; the cache serves reads
//! - One mutation scope for the whole store, so same-key updates are serialized
//! - Failed durable writes leave the cache untouched; callers may fall back to
//!   in-memory updates

pub mod record;
pub mod snapshot;
pub mod state_store;
pub mod sweeper;

pub use record::{SessionRecord, SessionStatus, Sessions};
pub use state_store::{StateStore, StoreSummary};
pub use sweeper::{SessionSweeper, SweepReport};
