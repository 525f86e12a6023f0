//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the traffic relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Listener configuration for the bundled host server.
    pub listener: ListenerConfig,

    /// Relay target and outbound transport settings.
    pub relay: RelaySettings,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Settings read by the relay plugin.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Target URL whose scheme and host receive all relayed traffic.
    pub target: Option<String>,

    /// Cookie allow-list. Declared but not enforced: cookies are always stripped.
    pub cookies: Option<String>,

    /// Idle timeout for pooled outbound HTTP connections, in seconds.
    pub idle_timeout_secs: u64,

    /// Honor `HTTP_PROXY`/`HTTPS_PROXY` for outbound HTTP requests.
    pub use_env_proxy: bool,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            target: None,
            cookies: None,
            idle_timeout_secs: 2,
            use_env_proxy: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: RelayConfig = toml::from_str(
            r#"
            [relay]
            target = "https://backend.internal:8443"
            "#,
        )
        .unwrap();

        assert_eq!(config.relay.target.as_deref(), Some("https://backend.internal:8443"));
        assert_eq!(config.relay.idle_timeout_secs, 2);
        assert!(config.relay.use_env_proxy);
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert!(!config.observability.metrics_enabled);
    }
}
