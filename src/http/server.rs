//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the plugin-chain handler
//! - Wire up middleware (tracing, request ID)
//! - Serve with upgrades enabled so plugins can take over raw connections
//! - Fall back to 502 when no plugin produced a response

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::http::request::{
    MakeRequestUuid, PropagateRequestIdLayer, RequestIdExt, SetRequestIdLayer,
};
use crate::http::response::plain_error;
use crate::plugin::{Exchange, TrafficPlugin};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub plugins: Arc<Vec<Arc<dyn TrafficPlugin>>>,
}

/// Host server driving a chain of traffic plugins.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a server that offers every request to `plugins`, in order.
    pub fn new(plugins: Vec<Arc<dyn TrafficPlugin>>) -> Self {
        for plugin in &plugins {
            let mut vars: Vec<_> = plugin.config_vars().into_iter().collect();
            vars.sort();
            tracing::info!(
                plugin = plugin.name(),
                config_vars = ?vars,
                "Traffic plugin registered"
            );
        }

        let state = AppState {
            plugins: Arc::new(plugins),
        };
        Self {
            router: Self::build_router(state),
        }
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .fallback(plugin_chain_handler)
            .with_state(state)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The router, for driving the server without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Offer the request to each plugin, telling later plugins whether an earlier
/// one already serviced it.
async fn plugin_chain_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let request_id = request.request_id().to_owned();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let mut exchange = Exchange::new(request);
    let mut serviced = false;

    for plugin in state.plugins.iter() {
        if plugin.handle_request(&mut exchange, serviced).await {
            tracing::debug!(
                request_id = %request_id,
                plugin = plugin.name(),
                method = %method,
                uri = %uri,
                "Request serviced"
            );
            serviced = true;
        }
    }

    match exchange.into_response() {
        Some(response) => response,
        None => {
            tracing::warn!(
                request_id = %request_id,
                method = %method,
                uri = %uri,
                serviced,
                "No plugin produced a response"
            );
            plain_error(StatusCode::BAD_GATEWAY, "Relay was unable to service the request")
        }
    }
}
