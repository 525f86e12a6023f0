//! Buffered request/response relaying.
//!
//! # Body framing
//! ```text
//! target declares length > 0  → stream exactly that many bytes
//! target declares length == 0 → status and headers only
//! target declares nothing     → buffer, then send with a computed Content-Length
//! ```

use axum::body::{Body, HttpBody};
use axum::http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures_util::{future, Stream, StreamExt};

use crate::http::response::plain_error;
use crate::plugin::Exchange;
use crate::relay::rewrite::is_absolute;

/// How the target framed its response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// Declared zero length, or a response that cannot carry a body.
    Empty,
    /// Declared exact length.
    Exact(u64),
    /// No declared length (chunked or close-delimited).
    Unknown,
}

impl BodyFraming {
    pub fn from_declared(length: Option<u64>) -> Self {
        match length {
            Some(0) => Self::Empty,
            Some(n) => Self::Exact(n),
            None => Self::Unknown,
        }
    }
}

/// Relay a rewritten request to the target and write its response.
///
/// Returns false only when the round trip itself fails; that leaves the
/// exchange without a response for the host to deal with.
pub async fn relay_http(client: &reqwest::Client, exchange: &mut Exchange) -> bool {
    let uri = exchange.request().uri().clone();
    if !is_absolute(&uri) {
        tracing::warn!(uri = %uri, "Url was not absolute");
        exchange.respond(plain_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("This plugin can not respond to non-relay requests: {}", uri),
        ));
        return true;
    }

    let body = exchange.take_body();
    let mut outbound = client
        .request(exchange.request().method().clone(), uri.to_string())
        .headers(exchange.request().headers().clone());
    if body.size_hint().exact() != Some(0) {
        outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }

    let target_response = match outbound.send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(uri = %uri, error = %e, "Cannot read response from server");
            return false;
        }
    };

    let status = target_response.status();
    let framing = BodyFraming::from_declared(target_response.content_length());
    let mut headers = relayed_headers(target_response.headers());

    tracing::debug!(uri = %uri, status = %status, framing = ?framing, "Relaying target response");

    let body = match framing {
        BodyFraming::Exact(length) => {
            Body::from_stream(take_exact(target_response.bytes_stream(), length))
        }
        BodyFraming::Unknown => match target_response.bytes().await {
            Ok(buffered) => {
                headers.insert(CONTENT_LENGTH, HeaderValue::from(buffered.len()));
                Body::from(buffered)
            }
            Err(e) => {
                tracing::error!(uri = %uri, error = %e, "Cannot read a body");
                return true;
            }
        },
        BodyFraming::Empty => Body::empty(),
    };

    exchange.respond(build_response(status, headers, body));
    true
}

/// Copy every target header, keeping repeated values. `Transfer-Encoding`
/// is connection framing and is re-derived by the serving side.
fn relayed_headers(source: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(source.len());
    for (name, value) in source {
        if name == TRANSFER_ENCODING {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

fn build_response(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Yield at most `length` bytes from `stream`.
fn take_exact<S>(
    stream: S,
    length: u64,
) -> impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    stream.scan(length, |remaining, chunk| {
        let item = match chunk {
            Ok(_) if *remaining == 0 => None,
            Ok(mut bytes) => {
                if bytes.len() as u64 > *remaining {
                    bytes.truncate(*remaining as usize);
                }
                *remaining -= bytes.len() as u64;
                Some(Ok(bytes))
            }
            Err(e) => {
                tracing::error!(error = %e, "Error copying to client");
                Some(Err(e))
            }
        };
        future::ready(item)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn framing_from_declared_length() {
        assert_eq!(BodyFraming::from_declared(Some(0)), BodyFraming::Empty);
        assert_eq!(BodyFraming::from_declared(Some(5)), BodyFraming::Exact(5));
        assert_eq!(BodyFraming::from_declared(None), BodyFraming::Unknown);
    }

    #[test]
    fn relayed_headers_keep_duplicates_and_drop_transfer_encoding() {
        let mut source = HeaderMap::new();
        source.append("set-cookie", HeaderValue::from_static("a=1"));
        source.append("set-cookie", HeaderValue::from_static("b=2"));
        source.insert("x-a", HeaderValue::from_static("1"));
        source.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));

        let headers = relayed_headers(&source);
        assert_eq!(headers.get_all("set-cookie").iter().count(), 2);
        assert_eq!(headers["x-a"], "1");
        assert!(headers.get(TRANSFER_ENCODING).is_none());
    }

    #[tokio::test]
    async fn non_absolute_request_is_rejected_without_contacting_target() {
        let client = reqwest::Client::new();
        let request = Request::builder().uri("/no/host").body(Body::empty()).unwrap();
        let mut exchange = Exchange::new(request);

        assert!(relay_http(&client, &mut exchange).await);

        let response = exchange.into_response().unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(
            &body[..],
            b"This plugin can not respond to non-relay requests: /no/host\n"
        );
    }

    #[tokio::test]
    async fn round_trip_failure_is_not_handled() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let request = Request::builder()
            .uri(format!("http://127.0.0.1:{}/", port))
            .body(Body::empty())
            .unwrap();
        let mut exchange = Exchange::new(request);

        assert!(!relay_http(&client, &mut exchange).await);
        assert!(exchange.response().is_none());
    }

    #[tokio::test]
    async fn body_read_failure_is_handled_without_response() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = [0u8; 1024];
            let _ = socket.read(&mut head).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhel")
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
        });

        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let request = Request::builder()
            .uri(format!("http://{}/", addr))
            .body(Body::empty())
            .unwrap();
        let mut exchange = Exchange::new(request);

        assert!(relay_http(&client, &mut exchange).await);
        assert!(exchange.response().is_none());
    }
}
