//! Background session maintenance.
//!
//! Each pass marks quiet sessions idle, removes expired and closed ones,
//! and flushes in-memory activity to disk.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::StoreConfig;
use crate::error::PersistenceError;
use crate::store::StateStore;

/// What one sweeper pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub marked_idle: usize,
    pub expired: usize,
    pub closed: usize,
    pub flushed: bool,
}

pub struct SessionSweeper {
    store: Arc<StateStore>,
    config: StoreConfig,
}

impl SessionSweeper {
    pub fn new(store: Arc<StateStore>, config: StoreConfig) -> Self {
        Self { store, config }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval = self.config.sweep_interval_secs,
            idle_threshold = self.config.idle_threshold_secs,
            "Session sweeper starting"
        );

        let mut ticker = time::interval(time::Duration::from_secs(self.config.sweep_interval_secs));
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        // The first tick fires immediately; nothing can have expired yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Session sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }

        if let Err(e) = self.store.flush().await {
            tracing::warn!(error = %e, "Final session flush failed");
        }
    }

    /// One maintenance pass. Removals apply even when the snapshot cannot
    /// be written; `flushed` is false in that case.
    pub async fn run_once(&self) -> SweepReport {
        let now = Utc::now();
        let marked_idle = self.store.mark_idle_at(now, self.config.idle_after()).await;
        let expired = self.store.sweep_at(now, self.config.idle_threshold()).await;
        let closed = self.store.purge_closed().await;
        let flushed = match self.store.flush().await {
            Ok(flushed) => flushed,
            Err(PersistenceError::Disabled(_)) => false,
            Err(e) => {
                tracing::warn!(error = %e, "Session sweep could not persist");
                false
            }
        };

        let report = SweepReport {
            marked_idle,
            expired,
            closed,
            flushed,
        };
        if expired + closed + marked_idle > 0 {
            tracing::info!(
                marked_idle,
                expired,
                closed,
                remaining = self.store.len(),
                "Session sweep"
            );
        }
        report
    }
}
