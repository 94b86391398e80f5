//! Active upstream probing.
//!
//! # Responsibilities
//! - Periodically probe every configured target
//! - Feed round results to the supervisor

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::health::HealthSupervisor;
use crate::upstream::UpstreamConnector;

pub struct HealthMonitor {
    connector: Arc<UpstreamConnector>,
    supervisor: Arc<HealthSupervisor>,
    config: HealthCheckConfig,
}

impl HealthMonitor {
    pub fn new(
        connector: Arc<UpstreamConnector>,
        supervisor: Arc<HealthSupervisor>,
        config: HealthCheckConfig,
    ) -> Self {
        Self {
            connector,
            supervisor,
            config,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval = self.config.interval_secs,
            timeout = self.config.timeout_secs,
            path = self.config.path.as_deref().unwrap_or("<connect only>"),
            "Health monitor starting"
        );

        // First tick fires immediately, so startup readiness is not delayed
        // by a whole interval.
        let mut ticker = time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every target once and report the round. Returns how many
    /// targets answered.
    pub async fn check_all(&self) -> usize {
        let pools = self.connector.pools();
        let mut reachable = 0;
        for pool in pools {
            let result = self
                .connector
                .probe(pool, self.config.path.as_deref(), self.config.timeout())
                .await;
            if result.is_ok() {
                reachable += 1;
            }
        }

        tracing::debug!(reachable, total = pools.len(), "Probe round finished");
        self.supervisor.probe_round(reachable, pools.len());
        reachable
    }
}
