//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order
//! - Start background tasks (probing, session sweeping)
//! - Serve until shutdown, then stop tasks and flush sessions
//!
//! # Design Decisions
//! - Configuration and target errors are fatal before any socket is bound
//! - Store load errors are not fatal: the store runs detached and health
//!   reports unready

use std::sync::Arc;

use axum::http::header::InvalidHeaderName;
use tokio::net::TcpListener;

use crate::config::RelayConfig;
use crate::health::{HealthMonitor, HealthSupervisor};
use crate::http::{AppState, HttpServer};
use crate::lifecycle::Shutdown;
use crate::relay::{IdentityResolver, RelayEngine};
use crate::store::{SessionSweeper, StateStore};
use crate::upstream::{TargetError, UpstreamConnector};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid upstream configuration: {0}")]
    Upstream(#[from] TargetError),

    #[error("invalid identity.session_header: {0}")]
    SessionHeader(#[from] InvalidHeaderName),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Every subsystem wired together, ready to serve.
pub struct RelayService {
    config: Arc<RelayConfig>,
    state: AppState,
    store: Arc<StateStore>,
    connector: Arc<UpstreamConnector>,
    health: Arc<HealthSupervisor>,
}

impl RelayService {
    pub async fn bootstrap(config: RelayConfig) -> Result<Self, StartupError> {
        let config = Arc::new(config);

        let connector = Arc::new(UpstreamConnector::from_config(&config)?);
        let identity = IdentityResolver::from_config(&config.identity)?;
        let health = Arc::new(HealthSupervisor::new(&config.health_check));
        let store = Arc::new(open_store(&config, &health).await);

        tracing::info!(
            targets = ?config.upstream.targets,
            sessions = store.len(),
            persistent = store.is_persistent(),
            "Relay initialized"
        );

        let relay = Arc::new(RelayEngine::new(
            &config,
            identity,
            store.clone(),
            connector.clone(),
            health.clone(),
        ));
        let state = AppState::new(relay, config.clone());

        Ok(Self {
            config,
            state,
            store,
            connector,
            health,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Bind the configured listener address.
    pub async fn bind(&self) -> Result<TcpListener, StartupError> {
        let address = self.config.listener.bind_address.clone();
        TcpListener::bind(&address)
            .await
            .map_err(|source| StartupError::Bind { address, source })
    }

    /// Serve on `listener` until `shutdown` fires, then stop background
    /// tasks and flush pending session changes.
    pub async fn serve(self, listener: TcpListener, shutdown: Shutdown) -> std::io::Result<()> {
        let sweeper = SessionSweeper::new(self.store.clone(), self.config.store.clone());
        let sweeper_task = tokio::spawn(sweeper.run(shutdown.subscribe()));

        let monitor = HealthMonitor::new(
            self.connector.clone(),
            self.health.clone(),
            self.config.health_check.clone(),
        );
        let monitor_task = tokio::spawn(monitor.run(shutdown.subscribe()));

        let server = HttpServer::new(self.state);
        let result = server.run(listener, shutdown.subscribe()).await;

        // The server may also stop on an accept error.
        shutdown.trigger();
        let (sweeper_done, monitor_done) = tokio::join!(sweeper_task, monitor_task);
        if let Err(e) = sweeper_done {
            tracing::error!(error = %e, "Session sweeper task failed");
        }
        if let Err(e) = monitor_done {
            tracing::error!(error = %e, "Health monitor task failed");
        }

        result
    }
}

async fn open_store(config: &RelayConfig, health: &HealthSupervisor) -> StateStore {
    let data_dir = config.store.data_dir.as_path();
    let partition = &config.store.partition;

    match StateStore::load(data_dir, partition).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(
                error = %e,
                "State store failed to load; continuing in memory without persistence"
            );
            health.store_failed(&e.to_string());
            StateStore::detached(data_dir, partition, e.to_string())
        }
    }
}
