//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the session relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Upstream targets and connection pool settings.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Dial retry configuration.
    pub retries: RetryConfig,

    /// Session state persistence.
    pub store: StoreConfig,

    /// How clients are mapped to sessions.
    pub identity: IdentityConfig,

    /// Health supervision settings.
    pub health_check: HealthCheckConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Upstream targets and the outbound connection pool.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream addresses (e.g., "http://127.0.0.1:8080" or "10.0.0.5:80").
    pub targets: Vec<String>,

    /// Maximum concurrent outbound connections per target.
    pub max_connections_per_target: usize,

    /// Maximum idle connections kept for reuse per target.
    pub max_idle_per_target: usize,

    /// How long `connect` waits for a pool slot before giving up.
    pub acquire_timeout_ms: u64,

    /// `Retry-After` hint sent to clients when the pool is saturated.
    pub retry_after_secs: u64,

    /// Forward the client's Host header instead of the upstream authority.
    pub preserve_host: bool,

    /// How new sessions are assigned to a target.
    pub strategy: SelectionStrategy,
}

/// Target selection for sessions without an assignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    #[default]
    RoundRobin,
    LeastConnections,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            targets: vec!["http://127.0.0.1:8080".to_string()],
            max_connections_per_target: 32,
            max_idle_per_target: 8,
            acquire_timeout_ms: 2000,
            retry_after_secs: 1,
            preserve_host: false,
            strategy: SelectionStrategy::RoundRobin,
        }
    }
}

impl UpstreamConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// TCP connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Keep-alive window: maximum wait for upstream bytes, and the lifetime
    /// of an idle pooled connection.
    pub keep_alive_secs: u64,

    /// Overall deadline for a relayed request to produce response headers.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            keep_alive_secs: 120,
            request_secs: 120,
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }
}

/// Retry configuration for dialing upstream connections.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total dial attempts before reporting the upstream unreachable.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 2000,
        }
    }
}

/// Session store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the JSON snapshots.
    pub data_dir: PathBuf,

    /// Snapshot file stem; sessions live in `<data_dir>/<partition>.json`.
    pub partition: String,

    /// Sessions without activity for this long are removed by the sweeper.
    pub idle_threshold_secs: u64,

    /// Active sessions without activity for this long are marked idle.
    pub idle_after_secs: u64,

    /// Interval between sweeper runs.
    pub sweep_interval_secs: u64,

    /// Activity touches closer together than this are kept in memory and
    /// flushed by the sweeper.
    pub activity_flush_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            partition: "sessions".to_string(),
            idle_threshold_secs: 900,
            idle_after_secs: 120,
            sweep_interval_secs: 30,
            activity_flush_secs: 5,
        }
    }
}

impl StoreConfig {
    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    pub fn idle_after(&self) -> Duration {
        Duration::from_secs(self.idle_after_secs)
    }

    pub fn activity_flush(&self) -> Duration {
        Duration::from_secs(self.activity_flush_secs)
    }
}

/// Client identity derivation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Header carrying an explicit session key.
    pub session_header: String,

    /// Derive the session key from the Authorization header when no session
    /// header is present.
    pub use_authorization: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            session_header: "x-session-id".to_string(),
            use_authorization: true,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Upstream probe interval in seconds.
    pub interval_secs: u64,

    /// Upstream probe timeout in seconds.
    pub timeout_secs: u64,

    /// Optional upstream path to GET when probing. Without it a probe only
    /// establishes a connection.
    pub path: Option<String>,

    /// Consecutive relay failures that mark the relay degraded.
    pub degraded_threshold: u32,

    /// Window in which those failures must occur.
    pub degraded_window_secs: u64,

    /// Consecutive failed probe rounds that mark the relay unready.
    pub unready_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            timeout_secs: 5,
            path: None,
            degraded_threshold: 5,
            degraded_window_secs: 60,
            unready_threshold: 3,
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn degraded_window(&self) -> Duration {
        Duration::from_secs(self.degraded_window_secs)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the admin routes under `/admin`.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // Rejected by validation when the admin API is enabled.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}
