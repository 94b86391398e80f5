//! Per-target connection pool.
//!
//! # Responsibilities
//! - Cap concurrent outbound connections per target (semaphore)
//! - Keep idle HTTP/1.1 connections for reuse within the keep-alive window
//! - Track target health from dials and probes
//!
//! # Design Decisions
//! - A permit is held for the whole exchange, including body streaming
//! - Connections go back to the pool only once hyper reports them ready;
//!   a body abandoned by the client is drained first (`upstream::body`)
//! - Errored connections are dropped, never pooled

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use axum::body::Body;
use hyper::client::conn::http1::SendRequest;
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::upstream::target::UpstreamTarget;

pub(crate) type Sender = SendRequest<Body>;

/// Target health as last observed.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetHealth {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for TargetHealth {
    fn from(val: u8) -> Self {
        match val {
            1 => TargetHealth::Healthy,
            2 => TargetHealth::Unhealthy,
            _ => TargetHealth::Unknown,
        }
    }
}

struct IdleConnection {
    sender: Sender,
    since: Instant,
}

/// Connections and limits for one upstream target.
pub struct TargetPool {
    target: UpstreamTarget,
    slots: Arc<Semaphore>,
    max_connections: usize,
    idle: Mutex<Vec<IdleConnection>>,
    max_idle: usize,
    idle_timeout: Duration,
    health: AtomicU8,
}

impl std::fmt::Debug for TargetPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetPool")
            .field("target", &self.target)
            .field("in_flight", &self.in_flight())
            .field("idle", &self.idle_count())
            .field("health", &self.health())
            .finish()
    }
}

impl TargetPool {
    pub fn new(
        target: UpstreamTarget,
        max_connections: usize,
        max_idle: usize,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            target,
            slots: Arc::new(Semaphore::new(max_connections)),
            max_connections,
            idle: Mutex::new(Vec::new()),
            max_idle,
            idle_timeout,
            health: AtomicU8::new(TargetHealth::Unknown as u8),
        }
    }

    pub fn target(&self) -> &UpstreamTarget {
        &self.target
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Exchanges currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.max_connections - self.slots.available_permits()
    }

    pub fn idle_count(&self) -> usize {
        self.idle_guard().len()
    }

    pub fn health(&self) -> TargetHealth {
        TargetHealth::from(self.health.load(Ordering::Relaxed))
    }

    /// Healthy or not yet probed.
    pub fn is_healthy(&self) -> bool {
        self.health() != TargetHealth::Unhealthy
    }

    pub fn mark_success(&self) {
        let prev = self.health.swap(TargetHealth::Healthy as u8, Ordering::Relaxed);
        if prev == TargetHealth::Unhealthy as u8 {
            tracing::info!(upstream = %self.target, "Upstream reachable again");
        }
    }

    pub fn mark_failure(&self) {
        let prev = self.health.swap(TargetHealth::Unhealthy as u8, Ordering::Relaxed);
        if prev != TargetHealth::Unhealthy as u8 {
            tracing::warn!(upstream = %self.target, "Upstream marked unreachable");
        }
    }

    /// Wait up to `wait` for a free slot.
    pub async fn acquire(&self, wait: Duration) -> Option<OwnedSemaphorePermit> {
        match tokio::time::timeout(wait, self.slots.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Some(permit),
            _ => None,
        }
    }

    /// Most recently used live connection, discarding closed or expired ones.
    pub(crate) fn checkout_idle(&self) -> Option<Sender> {
        let mut idle = self.idle_guard();
        while let Some(conn) = idle.pop() {
            if conn.sender.is_closed() || conn.since.elapsed() >= self.idle_timeout {
                tracing::trace!(upstream = %self.target, "Discarding stale pooled connection");
                continue;
            }
            if conn.sender.is_ready() {
                return Some(conn.sender);
            }
        }
        None
    }

    fn checkin(&self, sender: Sender) {
        if sender.is_closed() {
            return;
        }
        let mut idle = self.idle_guard();
        if idle.len() < self.max_idle {
            idle.push(IdleConnection {
                sender,
                since: Instant::now(),
            });
        }
    }

    fn idle_guard(&self) -> MutexGuard<'_, Vec<IdleConnection>> {
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// An exclusive connection to a target, holding one pool slot.
///
/// Dropping the handle frees the slot and, unless the exchange errored,
/// returns the connection to the pool once it is ready for another request.
pub struct UpstreamHandle {
    pool: Arc<TargetPool>,
    sender: Option<Sender>,
    reused: bool,
    broken: bool,
    _permit: OwnedSemaphorePermit,
}

impl std::fmt::Debug for UpstreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamHandle")
            .field("target", self.target())
            .field("reused", &self.reused)
            .field("broken", &self.broken)
            .field("released", &self.sender.is_none())
            .finish()
    }
}

impl UpstreamHandle {
    pub(crate) fn new(
        pool: Arc<TargetPool>,
        sender: Sender,
        reused: bool,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            pool,
            sender: Some(sender),
            reused,
            broken: false,
            _permit: permit,
        }
    }

    pub fn target(&self) -> &UpstreamTarget {
        self.pool.target()
    }

    pub(crate) fn pool(&self) -> &Arc<TargetPool> {
        &self.pool
    }

    /// Whether the connection came from the idle pool.
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    /// Keep this connection out of the pool.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub(crate) fn sender_mut(&mut self) -> Option<&mut Sender> {
        self.sender.as_mut()
    }

    /// Swap in a freshly dialed connection, keeping the slot.
    pub(crate) fn replace_sender(&mut self, sender: Sender) {
        self.sender = Some(sender);
        self.reused = false;
        self.broken = false;
    }
}

impl Drop for UpstreamHandle {
    fn drop(&mut self) {
        let Some(mut sender) = self.sender.take() else {
            return;
        };
        if self.broken || sender.is_closed() {
            return;
        }
        if sender.is_ready() {
            self.pool.checkin(sender);
            return;
        }

        // Hyper may still be winding down the exchange after the body
        // ended. Pool it once the connection reports ready.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let pool = self.pool.clone();
        let wait = pool.idle_timeout;
        runtime.spawn(async move {
            if let Ok(Ok(())) = tokio::time::timeout(wait, sender.ready()).await {
                pool.checkin(sender);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(max: usize) -> TargetPool {
        TargetPool::new(
            UpstreamTarget::parse("127.0.0.1:9").unwrap(),
            max,
            4,
            Duration::from_secs(120),
        )
    }

    #[tokio::test]
    async fn acquire_waits_then_gives_up() {
        let pool = pool(1);
        let first = pool.acquire(Duration::from_millis(10)).await;
        assert!(first.is_some());
        assert_eq!(pool.in_flight(), 1);

        assert!(pool.acquire(Duration::from_millis(20)).await.is_none());

        drop(first);
        assert_eq!(pool.in_flight(), 0);
        assert!(pool.acquire(Duration::from_millis(10)).await.is_some());
    }

    #[test]
    fn health_transitions() {
        let pool = pool(1);
        assert_eq!(pool.health(), TargetHealth::Unknown);
        assert!(pool.is_healthy());

        pool.mark_failure();
        assert!(!pool.is_healthy());

        pool.mark_success();
        assert_eq!(pool.health(), TargetHealth::Healthy);
    }

    #[test]
    fn empty_pool_has_nothing_to_check_out() {
        assert!(pool(2).checkout_idle().is_none());
    }
}
