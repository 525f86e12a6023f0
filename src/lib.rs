//! Traffic relay library.
//!
//! A plugin for an HTTP host that forwards every request it services to a
//! single configured target, including websocket upgrades spliced at the
//! byte level.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod plugin;
pub mod relay;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::RelayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use plugin::{Exchange, TrafficPlugin};
pub use relay::RelayPlugin;
