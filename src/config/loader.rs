//! Configuration loading from disk and environment.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::RelayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value '{value}' for {var}")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration from an optional TOML file, apply environment
/// overrides, and validate the result.
pub fn load_config(path: Option<&Path>) -> Result<RelayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&content)?
        }
        None => RelayConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay `RELAY_*` variables on top of file configuration.
pub fn apply_env_overrides<F>(config: &mut RelayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(bind) = lookup("RELAY_BIND") {
        config.listener.bind_address = bind;
    }
    if let Some(upstream) = lookup("RELAY_UPSTREAM") {
        config.upstream.targets = upstream
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(dir) = lookup("RELAY_DATA_DIR") {
        config.store.data_dir = PathBuf::from(dir);
    }
    if let Some(value) = lookup("RELAY_IDLE_SECS") {
        config.store.idle_threshold_secs = parse_env("RELAY_IDLE_SECS", value)?;
    }
    if let Some(value) = lookup("RELAY_POOL_SIZE") {
        config.upstream.max_connections_per_target = parse_env("RELAY_POOL_SIZE", value)?;
    }
    if let Some(value) = lookup("RELAY_REQUEST_TIMEOUT_SECS") {
        config.timeouts.request_secs = parse_env("RELAY_REQUEST_TIMEOUT_SECS", value)?;
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { var, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn loads_partial_file_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[upstream]
targets = ["http://10.0.0.5:9000"]

[store]
data_dir = "/var/lib/relay"
"#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.upstream.targets, vec!["http://10.0.0.5:9000"]);
        assert_eq!(config.store.data_dir, PathBuf::from("/var/lib/relay"));
        assert_eq!(config.timeouts.keep_alive_secs, 120);
    }

    #[test]
    fn env_overrides_file_values() {
        let vars: HashMap<&str, &str> = [
            ("RELAY_UPSTREAM", "127.0.0.1:7000, 127.0.0.1:7001"),
            ("RELAY_IDLE_SECS", "60"),
            ("RELAY_POOL_SIZE", "4"),
        ]
        .into_iter()
        .collect();

        let mut config = RelayConfig::default();
        apply_env_overrides(&mut config, |k| vars.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.upstream.targets, vec!["127.0.0.1:7000", "127.0.0.1:7001"]);
        assert_eq!(config.store.idle_threshold_secs, 60);
        assert_eq!(config.upstream.max_connections_per_target, 4);
    }

    #[test]
    fn bad_env_number_is_config_error() {
        let mut config = RelayConfig::default();
        let err = apply_env_overrides(&mut config, |k| {
            (k == "RELAY_POOL_SIZE").then(|| "lots".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "RELAY_POOL_SIZE", .. }));
    }

    #[test]
    fn invalid_file_fails_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[upstream]\ntargets = []").unwrap();
        let err = load_config(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
