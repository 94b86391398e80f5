//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check cross-field constraints (request deadline within keep-alive window)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::HeaderName;

use crate::config::schema::RelayConfig;
use crate::upstream::target::UpstreamTarget;

/// Longest probe timeout the health supervisor accepts.
pub const MAX_PROBE_TIMEOUT_SECS: u64 = 30;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.upstream.targets.is_empty() {
        errors.push(ValidationError::new("upstream.targets", "at least one target is required"));
    }
    for target in &config.upstream.targets {
        if let Err(e) = UpstreamTarget::parse(target) {
            errors.push(ValidationError::new("upstream.targets", e.to_string()));
        }
    }
    if config.upstream.max_connections_per_target == 0 {
        errors.push(ValidationError::new(
            "upstream.max_connections_per_target",
            "must be greater than zero",
        ));
    }

    let timeouts = &config.timeouts;
    if timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than zero"));
    }
    if timeouts.keep_alive_secs == 0 {
        errors.push(ValidationError::new("timeouts.keep_alive_secs", "must be greater than zero"));
    }
    if timeouts.request_secs == 0 || timeouts.request_secs > timeouts.keep_alive_secs {
        errors.push(ValidationError::new(
            "timeouts.request_secs",
            format!("must be between 1 and keep_alive_secs ({})", timeouts.keep_alive_secs),
        ));
    }

    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be at least 1"));
    }
    if config.retries.base_delay_ms > config.retries.max_delay_ms {
        errors.push(ValidationError::new(
            "retries.base_delay_ms",
            "must not exceed retries.max_delay_ms",
        ));
    }

    let store = &config.store;
    if store.partition.is_empty()
        || store.partition.contains(['/', '\\'])
        || store.partition.starts_with('.')
    {
        errors.push(ValidationError::new(
            "store.partition",
            format!("'{}' is not a plain file stem", store.partition),
        ));
    }
    if store.idle_threshold_secs == 0 {
        errors.push(ValidationError::new("store.idle_threshold_secs", "must be greater than zero"));
    }
    if store.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("store.sweep_interval_secs", "must be greater than zero"));
    }

    if HeaderName::from_bytes(config.identity.session_header.as_bytes()).is_err() {
        errors.push(ValidationError::new(
            "identity.session_header",
            format!("'{}' is not a valid header name", config.identity.session_header),
        ));
    }

    let health = &config.health_check;
    if health.interval_secs == 0 {
        errors.push(ValidationError::new("health_check.interval_secs", "must be greater than zero"));
    }
    if health.timeout_secs == 0 || health.timeout_secs > MAX_PROBE_TIMEOUT_SECS {
        errors.push(ValidationError::new(
            "health_check.timeout_secs",
            format!("must be between 1 and {}", MAX_PROBE_TIMEOUT_SECS),
        ));
    }
    if let Some(path) = &health.path {
        if !path.starts_with('/') {
            errors.push(ValidationError::new("health_check.path", "must start with '/'"));
        }
    }
    if health.degraded_threshold == 0 {
        errors.push(ValidationError::new("health_check.degraded_threshold", "must be at least 1"));
    }
    if health.unready_threshold == 0 {
        errors.push(ValidationError::new("health_check.unready_threshold", "must be at least 1"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if config.admin.enabled
        && (config.admin.api_key.is_empty() || config.admin.api_key == "CHANGE_ME_IN_PRODUCTION")
    {
        errors.push(ValidationError::new("admin.api_key", "must be set when admin is enabled"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&RelayConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = RelayConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.upstream.targets.clear();
        config.timeouts.request_secs = 500;
        config.health_check.timeout_secs = 60;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "upstream.targets",
                "timeouts.request_secs",
                "health_check.timeout_secs",
            ]
        );
    }

    #[test]
    fn rejects_unsupported_target_scheme() {
        let mut config = RelayConfig::default();
        config.upstream.targets = vec!["https://example.com".into()];
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "upstream.targets");
    }

    #[test]
    fn admin_requires_real_key() {
        let mut config = RelayConfig::default();
        config.admin.enabled = true;
        assert!(validate_config(&config).is_err());

        config.admin.api_key = "s3cret".into();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn partition_must_be_a_file_stem() {
        let mut config = RelayConfig::default();
        config.store.partition = "../escape".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "store.partition");
    }
}
