//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! relay.toml (optional)
//!     → loader.rs (parse & deserialize)
//!     → TRAFFIC_RELAY_* environment overrides
//!     → validation.rs (semantic checks)
//!     → RelayConfig (validated, immutable)
//!
//! On reload (file change or SIGHUP):
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → relay resolves a new target
//!     → atomic swap of the relay's target snapshot
//! ```

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{
    load_config, ConfigError, TRAFFIC_RELAY_BIND, TRAFFIC_RELAY_COOKIES, TRAFFIC_RELAY_TARGET,
};
pub use schema::{ListenerConfig, ObservabilityConfig, RelayConfig, RelaySettings};
