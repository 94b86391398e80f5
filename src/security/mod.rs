//! Request and response hygiene at the relay boundary.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (strip hop-by-hop, add X-Forwarded-*)
//!     → forwarded upstream
//!
//! Upstream response:
//!     → headers.rs (strip hop-by-hop)
//!     → streamed to client
//! ```
//!
//! # Design Decisions
//! - No trust in client input: connection-scoped headers never cross
//! - Admin authentication lives in `admin::auth`

pub mod headers;
