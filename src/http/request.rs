//! Request ID assignment and lookup.
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - An incoming `x-request-id` is kept; otherwise a UUID v4 is generated
//! - The ID is echoed on the response to the client

use axum::http::Request;
use tower_http::request_id::RequestId;

pub use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

/// Read the request ID assigned by [`SetRequestIdLayer`].
pub trait RequestIdExt {
    fn request_id(&self) -> &str;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> &str {
        self.extensions()
            .get::<RequestId>()
            .and_then(|id| id.header_value().to_str().ok())
            .unwrap_or("unknown")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_assigned_id() {
        let mut request = Request::new(());
        assert_eq!(request.request_id(), "unknown");

        request
            .extensions_mut()
            .insert(RequestId::new(HeaderValue::from_static("abc-123")));
        assert_eq!(request.request_id(), "abc-123");
    }
}
