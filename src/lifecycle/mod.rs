//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → upstream connector → health supervisor
//!     → state store (load, or degrade to in-memory + unready)
//!     → relay engine → background tasks → listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → stop accepting → drain requests
//!     → stop prober and sweeper → final session flush → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: traffic is accepted only after every subsystem exists
//! - A store that fails to load does not stop the process; it reports
//!   unready so the container supervisor decides

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{RelayService, StartupError};
