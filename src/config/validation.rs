//! Configuration validation.
//!
//! Serde handles syntax; this checks values the relay cannot start with.
//! The relay target is deliberately not checked here: a bad target leaves the
//! relay unconfigured but the host keeps running, so it is resolved later by
//! [`crate::relay::RelayTarget::parse`].

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::RelayConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid listener bind address {0:?}")]
    BindAddress(String),

    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),

    #[error("relay idle timeout must be greater than zero")]
    IdleTimeout,
}

/// Validate a configuration, returning every problem found rather than the first.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if config.relay.idle_timeout_secs == 0 {
        errors.push(ValidationError::IdleTimeout);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
