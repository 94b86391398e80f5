//! Shared health status.
//!
//! Events arrive from the relay path and the prober; the resulting
//! snapshot is published through an `ArcSwap` so `/health` never waits
//! on a lock held by the relay path.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use arc_swap::ArcSwap;
use chrono::Utc;

use crate::config::HealthCheckConfig;
use crate::error::RelayError;
use crate::health::passive::FailureWindow;
use crate::health::state::{HealthMachine, HealthState, HealthStatus};
use crate::observability::metrics;

#[derive(Debug)]
struct Inner {
    machine: HealthMachine,
    failures: FailureWindow,
}

#[derive(Debug)]
pub struct HealthSupervisor {
    inner: Mutex<Inner>,
    status: ArcSwap<HealthStatus>,
}

impl HealthSupervisor {
    pub fn new(config: &HealthCheckConfig) -> Self {
        let status = HealthStatus::starting(Utc::now());
        metrics::record_health_state(status.state);
        Self {
            inner: Mutex::new(Inner {
                machine: HealthMachine::new(config.unready_threshold),
                failures: FailureWindow::new(
                    config.degraded_threshold as usize,
                    config.degraded_window(),
                ),
            }),
            status: ArcSwap::from_pointee(status),
        }
    }

    pub fn status(&self) -> Arc<HealthStatus> {
        self.status.load_full()
    }

    pub fn state(&self) -> HealthState {
        self.status.load().state
    }

    pub fn store_failed(&self, reason: &str) {
        let mut inner = self.lock();
        inner.machine.store_failed(reason);
        self.publish(&inner);
    }

    /// Outcome of one round of probes over every target.
    pub fn probe_round(&self, reachable: usize, total: usize) {
        let mut inner = self.lock();
        inner.machine.probe_round(reachable, total);
        self.publish(&inner);
    }

    pub fn relay_succeeded(&self) {
        let mut inner = self.lock();
        inner.failures.record_success();
        if inner.machine.state() == HealthState::Degraded {
            inner.machine.relay_succeeded();
            self.publish(&inner);
        }
    }

    pub fn relay_failed(&self, error: &RelayError) {
        if !error.is_upstream_failure() {
            return;
        }
        let mut inner = self.lock();
        if let Some(streak) = inner.failures.record_failure(Instant::now()) {
            let before = inner.machine.state();
            inner.machine.relay_failures_exceeded(streak);
            if inner.machine.state() != before {
                self.publish(&inner);
            }
        }
    }

    fn publish(&self, inner: &Inner) {
        let next = HealthStatus {
            ready: inner.machine.state().is_serving(),
            detail: inner.machine.detail().to_string(),
            state: inner.machine.state(),
            last_check: Utc::now(),
        };
        let previous = self.status.swap(Arc::new(next.clone()));
        if previous.state != next.state {
            if next.state.is_serving() {
                tracing::info!(from = ?previous.state, to = ?next.state, detail = %next.detail, "Health state changed");
            } else {
                tracing::warn!(from = ?previous.state, to = ?next.state, detail = %next.detail, "Health state changed");
            }
            metrics::record_health_state(next.state);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
