//! OS signal handling.
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP re-runs plugin configuration, not shutdown
//! - The first SIGTERM/SIGINT triggers graceful shutdown and ends the handler

use std::sync::Arc;

use crate::lifecycle::Shutdown;
use crate::plugin::TrafficPlugin;

/// Wait for OS signals until shutdown is requested.
pub async fn handle_signals(shutdown: Shutdown, plugins: Vec<Arc<dyn TrafficPlugin>>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let registered = (signal(SignalKind::terminate()), signal(SignalKind::hangup()));
        let (mut term, mut hup) = match registered {
            (Ok(term), Ok(hup)) => (term, hup),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(
                    error = %e,
                    "Could not register signal handlers; falling back to Ctrl-C"
                );
                wait_for_ctrl_c().await;
                shutdown.trigger();
                return;
            }
        };

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("SIGINT received, shutting down");
                    break;
                }
                _ = term.recv() => {
                    tracing::info!("SIGTERM received, shutting down");
                    break;
                }
                _ = hup.recv() => {
                    tracing::info!("SIGHUP received, reconfiguring plugins");
                    reconfigure(&plugins);
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = &plugins;
        wait_for_ctrl_c().await;
    }

    shutdown.trigger();
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Could not listen for Ctrl-C");
    }
}

/// Run `config` on every plugin, logging the ones that fail.
pub fn reconfigure(plugins: &[Arc<dyn TrafficPlugin>]) -> bool {
    let mut all_ok = true;
    for plugin in plugins {
        if !plugin.config() {
            tracing::warn!(plugin = plugin.name(), "Plugin configuration failed");
            all_ok = false;
        }
    }
    all_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::Exchange;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
        succeed: bool,
    }

    #[async_trait]
    impl TrafficPlugin for Counting {
        fn name(&self) -> &str {
            "Counting"
        }

        async fn handle_request(&self, _exchange: &mut Exchange, _serviced: bool) -> bool {
            false
        }

        fn config_vars(&self) -> HashMap<&'static str, bool> {
            HashMap::new()
        }

        fn config(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.succeed
        }
    }

    #[test]
    fn reconfigure_visits_every_plugin() {
        let ok = Arc::new(Counting { calls: AtomicUsize::new(0), succeed: true });
        let failing = Arc::new(Counting { calls: AtomicUsize::new(0), succeed: false });
        let plugins: Vec<Arc<dyn TrafficPlugin>> = vec![failing.clone(), ok.clone()];

        assert!(!reconfigure(&plugins));
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(ok.calls.load(Ordering::SeqCst), 1);
    }
}
