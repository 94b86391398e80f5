//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound a whole relayed request (pool wait, dial, response head) by one
//!   deadline
//! - Report how long was waited so errors can say so
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - The body stream has its own per-chunk idle timeout (see `upstream::body`)

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// A fixed point in time by which an operation must complete.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Duration,
}

/// The deadline passed before the operation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineExceeded {
    pub waited: Duration,
}

impl Deadline {
    pub fn after(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.started.elapsed())
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Run `fut` with whatever time is left.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, DeadlineExceeded> {
        tokio::time::timeout_at(self.started + self.limit, fut)
            .await
            .map_err(|_| DeadlineExceeded {
                waited: self.started.elapsed(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expires_after_limit() {
        let deadline = Deadline::after(Duration::from_secs(2));
        let result = deadline
            .run(tokio::time::sleep(Duration::from_secs(5)))
            .await;
        let exceeded = result.unwrap_err();
        assert!(exceeded.waited >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn shares_budget_across_steps() {
        let deadline = Deadline::after(Duration::from_secs(3));
        deadline
            .run(tokio::time::sleep(Duration::from_secs(2)))
            .await
            .unwrap();
        assert!(deadline.remaining() <= Duration::from_secs(1));
        assert!(deadline
            .run(tokio::time::sleep(Duration::from_secs(2)))
            .await
            .is_err());
    }
}
