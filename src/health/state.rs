//! Process health state machine.
//!
//! # States
//! - Starting: no successful probe yet; `/health` fails
//! - Ready: probes succeed; `/health` passes
//! - Degraded: repeated relay failures; `/health` still passes, detail says why
//! - Unready: store failed to load, or no target reachable for several
//!   probe rounds; `/health` fails
//!
//! # State Transitions
//! ```text
//! Starting → Ready:      first successful probe round (store loaded)
//! Ready → Degraded:      relay failure threshold reached in the window
//! Degraded → Ready:      a relay succeeds
//! * → Unready:           store load failure (sticky)
//! * → Unready:           consecutive failed probe rounds >= threshold
//! Unready → Ready:       successful probe round, unless the store failed
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Starting = 0,
    Ready = 1,
    Degraded = 2,
    Unready = 3,
}

impl HealthState {
    /// Whether `/health` reports success.
    pub fn is_serving(self) -> bool {
        matches!(self, HealthState::Ready | HealthState::Degraded)
    }
}

/// Published snapshot served by `/health`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub ready: bool,
    pub detail: String,
    pub state: HealthState,
    pub last_check: DateTime<Utc>,
}

impl HealthStatus {
    pub fn starting(now: DateTime<Utc>) -> Self {
        Self {
            ready: false,
            detail: "waiting for first upstream probe".to_string(),
            state: HealthState::Starting,
            last_check: now,
        }
    }
}

/// Pure transition logic. Callers supply the events; nothing here reads
/// the clock.
#[derive(Debug)]
pub struct HealthMachine {
    state: HealthState,
    detail: String,
    store_failure: Option<String>,
    failed_probe_rounds: u32,
    unready_threshold: u32,
}

impl HealthMachine {
    pub fn new(unready_threshold: u32) -> Self {
        Self {
            state: HealthState::Starting,
            detail: "waiting for first upstream probe".to_string(),
            store_failure: None,
            failed_probe_rounds: 0,
            unready_threshold: unready_threshold.max(1),
        }
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// The state store could not be loaded. Nothing recovers from this.
    pub fn store_failed(&mut self, reason: &str) {
        self.store_failure = Some(reason.to_string());
        self.set(HealthState::Unready, format!("state store unavailable: {reason}"));
    }

    /// Result of one probe round across all targets.
    pub fn probe_round(&mut self, reachable: usize, total: usize) {
        if self.store_failure.is_some() {
            return;
        }

        if reachable > 0 {
            self.failed_probe_rounds = 0;
            match self.state {
                HealthState::Starting | HealthState::Unready => self.set(
                    HealthState::Ready,
                    format!("{reachable}/{total} upstream target(s) reachable"),
                ),
                HealthState::Ready => {
                    self.detail = format!("{reachable}/{total} upstream target(s) reachable");
                }
                HealthState::Degraded => {}
            }
            return;
        }

        self.failed_probe_rounds += 1;
        if self.failed_probe_rounds >= self.unready_threshold {
            self.set(
                HealthState::Unready,
                format!(
                    "no upstream target reachable for {} probe round(s)",
                    self.failed_probe_rounds
                ),
            );
        }
    }

    /// The relay failure window reached its threshold.
    pub fn relay_failures_exceeded(&mut self, failures: usize) {
        if self.state == HealthState::Ready {
            self.set(
                HealthState::Degraded,
                format!("degraded: {failures} consecutive relay failures"),
            );
        }
    }

    pub fn relay_succeeded(&mut self) {
        if self.state == HealthState::Degraded {
            self.set(HealthState::Ready, "relay recovered".to_string());
        }
    }

    fn set(&mut self, state: HealthState, detail: String) {
        self.state = state;
        self.detail = detail;
    }
}
