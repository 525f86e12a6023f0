//! Traffic relay host.
//!
//! ```text
//!     Client ──▶ http::server ──▶ plugin chain ──▶ RelayPlugin ──▶ Target
//!                                                     │
//!                          Upgrade: websocket ──▶ raw splice (net::dial + relay::transfer)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use traffic_relay::config::{load_config, watcher::ConfigWatcher};
use traffic_relay::http::HttpServer;
use traffic_relay::lifecycle::{handle_signals, Shutdown};
use traffic_relay::observability::{logging, metrics};
use traffic_relay::plugin::TrafficPlugin;
use traffic_relay::relay::RelayPlugin;

#[derive(Parser)]
#[command(name = "traffic-relay")]
#[command(
    about = "Relays HTTP and websocket traffic to a single configured target",
    long_about = None
)]
struct Cli {
    /// TOML configuration file; TRAFFIC_RELAY_* environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!("traffic-relay v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        idle_timeout_secs = config.relay.idle_timeout_secs,
        use_env_proxy = config.relay.use_env_proxy,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let relay = Arc::new(RelayPlugin::new(&config.relay, cli.config.clone())?);
    if !relay.apply_config(&config) {
        tracing::warn!(
            "Relay starts unconfigured; requests will be rejected until a target is set"
        );
    }

    // Keep the watcher alive for the life of the process.
    let _watcher = match &cli.config {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let relay = relay.clone();
            tokio::spawn(async move {
                while let Some(new_config) = updates.recv().await {
                    relay.apply_config(&new_config);
                }
            });
            match watcher.run() {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::error!(
                        path = %path.display(),
                        error = %e,
                        "Config hot reload disabled"
                    );
                    None
                }
            }
        }
        None => None,
    };

    let plugins: Vec<Arc<dyn TrafficPlugin>> = vec![relay];
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(handle_signals(shutdown, plugins.clone()));

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    HttpServer::new(plugins).run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
