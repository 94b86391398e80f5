//! Passive health checking (relay failure detection).
//!
//! # Responsibilities
//! - Observe relay outcomes
//! - Count consecutive failures inside a sliding time window
//!
//! # Design Decisions
//! - Upstream unreachable and timeout count as failures
//! - Pool saturation is local backpressure and does not count
//! - Any success resets the streak

use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct FailureWindow {
    threshold: usize,
    window: Duration,
    failures: VecDeque<Instant>,
}

impl FailureWindow {
    pub fn new(threshold: usize, window: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            window,
            failures: VecDeque::new(),
        }
    }

    /// Record a failure at `now`. Returns the streak length when it has
    /// reached the threshold.
    pub fn record_failure(&mut self, now: Instant) -> Option<usize> {
        self.failures.push_back(now);
        while let Some(oldest) = self.failures.front() {
            if now.duration_since(*oldest) > self.window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
        (self.failures.len() >= self.threshold).then_some(self.failures.len())
    }

    pub fn record_success(&mut self) {
        self.failures.clear();
    }

    pub fn streak(&self) -> usize {
        self.failures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_within_window() {
        let mut window = FailureWindow::new(5, Duration::from_secs(60));
        let start = Instant::now();
        for i in 0..4 {
            assert_eq!(window.record_failure(start + Duration::from_secs(i)), None);
        }
        assert_eq!(window.record_failure(start + Duration::from_secs(4)), Some(5));
    }

    #[test]
    fn old_failures_fall_out_of_window() {
        let mut window = FailureWindow::new(3, Duration::from_secs(10));
        let start = Instant::now();
        window.record_failure(start);
        window.record_failure(start + Duration::from_secs(1));
        assert_eq!(window.record_failure(start + Duration::from_secs(30)), None);
        assert_eq!(window.streak(), 1);
    }

    #[test]
    fn success_resets_streak() {
        let mut window = FailureWindow::new(2, Duration::from_secs(60));
        let start = Instant::now();
        window.record_failure(start);
        window.record_success();
        assert_eq!(window.record_failure(start), None);
    }
}
