//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, gauges, histograms via `metrics`)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Prometheus scrape endpoint (optional, separate listener)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every span on the relay path
//! - Metric updates are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
