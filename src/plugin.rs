//! Host plugin contract.
//!
//! The host owns the listener and calls each [`TrafficPlugin`] in turn for
//! every inbound request, passing along whether an earlier plugin already
//! serviced it. A plugin services a request by writing a response into the
//! [`Exchange`] and returning `true`.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;

/// One in-flight request and the response slot plugins write into.
#[derive(Debug)]
pub struct Exchange {
    request: Request<Body>,
    response: Option<Response>,
}

impl Exchange {
    pub fn new(request: Request<Body>) -> Self {
        Self {
            request,
            response: None,
        }
    }

    pub fn request(&self) -> &Request<Body> {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request<Body> {
        &mut self.request
    }

    /// Take the request body, leaving an empty one behind.
    pub fn take_body(&mut self) -> Body {
        std::mem::take(self.request.body_mut())
    }

    /// Write the client-facing response. A later call replaces an earlier one.
    pub fn respond(&mut self, response: Response) {
        self.response = Some(response);
    }

    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    pub fn into_response(self) -> Option<Response> {
        self.response
    }
}

/// A traffic plugin driven by the host.
#[async_trait]
pub trait TrafficPlugin: Send + Sync {
    /// Human-readable plugin name.
    fn name(&self) -> &str;

    /// Handle one request. Returns whether this plugin serviced it.
    ///
    /// When `serviced` is already true the plugin must decline without doing
    /// any work.
    async fn handle_request(&self, exchange: &mut Exchange, serviced: bool) -> bool;

    /// Configuration keys the plugin reads, mapped to whether each is required.
    fn config_vars(&self) -> HashMap<&'static str, bool>;

    /// Reload configuration. Returns false if it could not be applied.
    fn config(&self) -> bool;
}
