//! Inbound request rewriting.

use axum::http::header::{COOKIE, HOST, ORIGIN};
use axum::http::uri::PathAndQuery;
use axum::http::{Request, Uri};

use crate::relay::target::RelayTarget;

/// Point `request` at `target`.
///
/// Replaces the URI scheme and authority (path and query are kept), sets
/// `Host` and `Origin` to the target's, and strips every `Cookie` header.
/// All other headers pass through untouched.
pub fn rewrite_request<B>(request: &mut Request<B>, target: &RelayTarget) {
    let mut parts = request.uri().clone().into_parts();
    parts.scheme = Some(target.scheme().into());
    parts.authority = Some(target.host().clone());
    if parts.path_and_query.is_none() {
        parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    match Uri::from_parts(parts) {
        Ok(uri) => *request.uri_mut() = uri,
        Err(e) => tracing::warn!(uri = %request.uri(), error = %e, "Could not rewrite request URI"),
    }

    let headers = request.headers_mut();
    headers.insert(HOST, target.host_header().clone());
    headers.insert(ORIGIN, target.origin().clone());
    // TODO: honor TRAFFIC_RELAY_COOKIES as an allow-list instead of stripping everything.
    headers.remove(COOKIE);
}

/// Strip the destination from a request that has no target to go to.
///
/// The URI keeps only its path and query, so it is no longer absolute and
/// neither relay path will contact a client-named host. `Cookie` is dropped
/// as it is for a configured target.
pub fn detach_request<B>(request: &mut Request<B>) {
    let path_and_query = request
        .uri()
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));
    *request.uri_mut() = Uri::from(path_and_query);
    request.headers_mut().remove(COOKIE);
}

/// True when the URI carries both a scheme and an authority.
pub fn is_absolute(uri: &Uri) -> bool {
    uri.scheme().is_some() && uri.authority().is_some()
}
