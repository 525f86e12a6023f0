//! Traffic relay plugin.
//!
//! # Data Flow
//! ```text
//! Exchange (from host)
//!     → RelayPlugin::handle_request (dispatcher)
//!     → target snapshot loaded once (ArcSwapOption)
//!     → rewrite.rs (scheme/host, Host, Origin, strip Cookie)
//!     → Upgrade: websocket?
//!         yes → upgrade.rs (dial, replay, hijack, transfer.rs)
//!         no  → forward.rs (round trip, re-frame body)
//! ```
//!
//! # Design Decisions
//! - One explicitly constructed instance per host, shared via `Arc`
//! - Reconfiguration builds a new immutable target and swaps it in atomically
//! - A failed reconfiguration keeps the previous target

pub mod forward;
pub mod rewrite;
pub mod target;
pub mod transfer;
pub mod upgrade;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use thiserror::Error;
use tokio_rustls::TlsConnector;

use crate::config::{
    load_config, RelayConfig, RelaySettings, TRAFFIC_RELAY_COOKIES, TRAFFIC_RELAY_TARGET,
};
use crate::net::{tls, TunnelTracker};
use crate::observability::metrics;
use crate::plugin::{Exchange, TrafficPlugin};

pub use rewrite::{detach_request, rewrite_request};
pub use target::{RelayTarget, TargetError, TargetScheme};
pub use transfer::{transfer, TransferStats};

/// Errors constructing a relay instance.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("could not build outbound HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("could not build outbound TLS config: {0}")]
    Tls(#[from] rustls::Error),
}

/// Relays every request it services to a single configured target.
pub struct RelayPlugin {
    target: ArcSwapOption<RelayTarget>,
    client: reqwest::Client,
    tls: TlsConnector,
    tunnels: TunnelTracker,
    config_path: Option<PathBuf>,
}

impl RelayPlugin {
    /// Build an unconfigured relay. Call [`RelayPlugin::configure`] or
    /// [`TrafficPlugin::config`] to resolve a target.
    ///
    /// `config_path` is the file re-read by [`TrafficPlugin::config`];
    /// environment overrides apply either way.
    pub fn new(settings: &RelaySettings, config_path: Option<PathBuf>) -> Result<Self, RelayError> {
        let mut builder = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .pool_idle_timeout(Duration::from_secs(settings.idle_timeout_secs))
            .redirect(reqwest::redirect::Policy::none());
        if !settings.use_env_proxy {
            builder = builder.no_proxy();
        }

        Ok(Self {
            target: ArcSwapOption::empty(),
            client: builder.build()?,
            tls: tls::insecure_connector()?,
            tunnels: TunnelTracker::new(),
            config_path,
        })
    }

    /// Resolve `url` and publish it as the new target.
    ///
    /// On failure the current target, if any, is left in place.
    pub fn configure(&self, url: &str) -> Result<Arc<RelayTarget>, TargetError> {
        let target = Arc::new(RelayTarget::parse(url)?);
        self.target.store(Some(target.clone()));
        tracing::info!(target = %target, "Relay target configured");
        Ok(target)
    }

    /// Apply the relay section of a loaded configuration.
    pub fn apply_config(&self, config: &RelayConfig) -> bool {
        if config.relay.cookies.is_some() {
            tracing::warn!(
                "{} is set but cookie allow-listing is not enforced",
                TRAFFIC_RELAY_COOKIES
            );
        }

        let url = config.relay.target.as_deref().unwrap_or_default();
        match self.configure(url) {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(
                    var = TRAFFIC_RELAY_TARGET,
                    error = %e,
                    "Could not configure relay target"
                );
                false
            }
        }
    }

    /// Current target snapshot, if configured.
    pub fn target(&self) -> Option<Arc<RelayTarget>> {
        self.target.load_full()
    }

    /// Upgrade connections currently being spliced.
    pub fn active_tunnels(&self) -> u64 {
        self.tunnels.active_count()
    }
}

#[async_trait]
impl TrafficPlugin for RelayPlugin {
    fn name(&self) -> &str {
        "Relay"
    }

    async fn handle_request(&self, exchange: &mut Exchange, serviced: bool) -> bool {
        if serviced {
            return false;
        }

        match self.target.load_full() {
            Some(target) => rewrite_request(exchange.request_mut(), &target),
            None => {
                tracing::warn!(uri = %exchange.request().uri(), "Relay target is not configured");
                detach_request(exchange.request_mut());
            }
        }

        let (path, handled) = if upgrade::is_upgrade_request(exchange.request()) {
            ("upgrade", upgrade::relay_upgrade(exchange, &self.tls, &self.tunnels).await)
        } else {
            ("http", forward::relay_http(&self.client, exchange).await)
        };

        let outcome = exchange
            .response()
            .map(|r| r.status().as_u16().to_string())
            .unwrap_or_else(|| "none".to_string());
        metrics::record_relay(path, outcome);

        handled
    }

    fn config_vars(&self) -> HashMap<&'static str, bool> {
        HashMap::from([(TRAFFIC_RELAY_TARGET, true), (TRAFFIC_RELAY_COOKIES, false)])
    }

    fn config(&self) -> bool {
        match load_config(self.config_path.as_deref()) {
            Ok(config) => self.apply_config(&config),
            Err(e) => {
                tracing::error!(error = %e, "Could not load relay configuration");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    fn relay() -> RelayPlugin {
        let settings = RelaySettings {
            use_env_proxy: false,
            ..RelaySettings::default()
        };
        RelayPlugin::new(&settings, None).unwrap()
    }

    #[test]
    fn identity_and_declared_vars() {
        let relay = relay();
        assert_eq!(relay.name(), "Relay");

        let vars = relay.config_vars();
        assert_eq!(vars.len(), 2);
        assert!(vars[TRAFFIC_RELAY_TARGET]);
        assert!(!vars[TRAFFIC_RELAY_COOKIES]);
    }

    #[test]
    fn failed_reconfiguration_keeps_previous_target() {
        let relay = relay();
        assert!(relay.target().is_none());

        relay.configure("http://first:8080").unwrap();
        assert!(relay.configure("::not a url::").is_err());
        assert_eq!(relay.target().unwrap().host().as_str(), "first:8080");

        relay.configure("https://second").unwrap();
        assert_eq!(relay.target().unwrap().to_string(), "https://second");
    }

    #[test]
    fn apply_config_without_target_fails() {
        let relay = relay();
        assert!(!relay.apply_config(&RelayConfig::default()));
        assert!(relay.target().is_none());

        let mut config = RelayConfig::default();
        config.relay.target = Some("http://svc:81".into());
        assert!(relay.apply_config(&config));
        assert_eq!(relay.target().unwrap().host().as_str(), "svc:81");
    }

    #[tokio::test]
    async fn declines_already_serviced_requests() {
        let relay = relay();
        relay.configure("http://127.0.0.1:9").unwrap();

        let request = Request::builder()
            .uri("/untouched")
            .header("Cookie", "keep=me")
            .body(Body::empty())
            .unwrap();
        let mut exchange = Exchange::new(request);

        assert!(!relay.handle_request(&mut exchange, true).await);
        assert!(exchange.response().is_none());
        assert_eq!(exchange.request().uri(), "/untouched");
        assert!(exchange.request().headers().contains_key("cookie"));
    }

    #[tokio::test]
    async fn unconfigured_relay_never_follows_absolute_uris() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let relay = relay();
        for upgrade in [false, true] {
            let mut builder = Request::builder()
                .uri(format!("http://{}/secret", addr))
                .header("Cookie", "session=1");
            if upgrade {
                builder = builder.header("Upgrade", "websocket");
            }
            let mut exchange = Exchange::new(builder.body(Body::empty()).unwrap());

            assert!(relay.handle_request(&mut exchange, false).await);
            assert!(exchange.request().headers().get("cookie").is_none());
            assert_eq!(
                exchange.response().unwrap().status(),
                StatusCode::INTERNAL_SERVER_ERROR
            );
        }

        let accepted =
            tokio::time::timeout(std::time::Duration::from_millis(200), listener.accept()).await;
        assert!(accepted.is_err(), "no connection may reach the client-named host");
    }

    #[tokio::test]
    async fn unconfigured_relay_rejects_with_500() {
        let relay = relay();
        let request = Request::builder().uri("/anything").body(Body::empty()).unwrap();
        let mut exchange = Exchange::new(request);

        assert!(relay.handle_request(&mut exchange, false).await);
        assert_eq!(
            exchange.response().unwrap().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
