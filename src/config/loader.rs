//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::RelayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Required: URL of the service all traffic is relayed to.
pub const TRAFFIC_RELAY_TARGET: &str = "TRAFFIC_RELAY_TARGET";
/// Optional: cookie allow-list (declared, not enforced).
pub const TRAFFIC_RELAY_COOKIES: &str = "TRAFFIC_RELAY_COOKIES";
/// Optional: bind address of the bundled host server.
pub const TRAFFIC_RELAY_BIND: &str = "TRAFFIC_RELAY_BIND";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

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

/// Load configuration from an optional TOML file, apply `TRAFFIC_RELAY_*`
/// environment overrides, and validate the result.
pub fn load_config(path: Option<&Path>) -> Result<RelayConfig, ConfigError> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// Same as [`load_config`] with an explicit variable lookup.
pub fn load_config_with<F>(path: Option<&Path>, lookup: F) -> Result<RelayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => RelayConfig::default(),
    };

    apply_env_overrides(&mut config, lookup);
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

fn apply_env_overrides<F>(config: &mut RelayConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(target) = lookup(TRAFFIC_RELAY_TARGET) {
        config.relay.target = Some(target);
    }
    if let Some(cookies) = lookup(TRAFFIC_RELAY_COOKIES) {
        config.relay.cookies = Some(cookies);
    }
    if let Some(bind) = lookup(TRAFFIC_RELAY_BIND) {
        config.listener.bind_address = bind;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn env_only_configuration() {
        let config = load_config_with(
            None,
            env(&[
                (TRAFFIC_RELAY_TARGET, "http://10.0.0.7:3000"),
                (TRAFFIC_RELAY_BIND, "127.0.0.1:9000"),
            ]),
        )
        .unwrap();

        assert_eq!(config.relay.target.as_deref(), Some("http://10.0.0.7:3000"));
        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert!(config.relay.cookies.is_none());
    }

    #[test]
    fn env_overrides_file() {
        let path = std::env::temp_dir().join(format!("traffic-relay-{}.toml", std::process::id()));
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[relay]\ntarget = \"http://from-file:80\"\nidle_timeout_secs = 7").unwrap();

        let config = load_config_with(
            Some(&path),
            env(&[(TRAFFIC_RELAY_TARGET, "https://from-env")]),
        )
        .unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(config.relay.target.as_deref(), Some("https://from-env"));
        assert_eq!(config.relay.idle_timeout_secs, 7);
    }

    #[test]
    fn invalid_bind_from_env_is_rejected() {
        let err = load_config_with(None, env(&[(TRAFFIC_RELAY_BIND, "bogus")])).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err =
            load_config_with(Some(Path::new("/nonexistent/relay.toml")), env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
