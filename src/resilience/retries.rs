//! Retry logic.
//!
//! # Responsibilities
//! - Run a fallible operation a bounded number of times
//! - Sleep with exponential backoff + jitter between attempts
//! - Stop early on errors the caller marks as permanent
//!
//! # Design Decisions
//! - Only connection establishment is retried; a request that reached the
//!   upstream is never replayed
//! - The delays actually slept are reported back for logging and tests

use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::resilience::backoff::calculate_backoff;

/// Bounded retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

/// All attempts failed.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub delays: Vec<Duration>,
    pub last_error: E,
}

impl RetryPolicy {
    /// Backoff after the `attempt`-th failure.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        calculate_backoff(
            attempt,
            self.base_delay.as_millis() as u64,
            self.max_delay.as_millis() as u64,
        )
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut, R>(&self, mut op: F, is_retryable: R) -> Result<T, RetryExhausted<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
    {
        let mut delays = Vec::new();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if attempt >= self.max_attempts || !is_retryable(&error) {
                        return Err(RetryExhausted {
                            attempts: attempt,
                            delays,
                            last_error: error,
                        });
                    }
                    let delay = self.delay_after(attempt);
                    tracing::debug!(attempt, delay = ?delay, "Retrying after failure");
                    tokio::time::sleep(delay).await;
                    delays.push(delay);
                }
            }
        }
    }
}

/// Whether a dial error may succeed on a later attempt.
pub fn is_retryable(error: &std::io::Error) -> bool {
    !matches!(
        error.kind(),
        std::io::ErrorKind::InvalidInput | std::io::ErrorKind::Unsupported
    )
}
