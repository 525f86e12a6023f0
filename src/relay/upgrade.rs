//! Protocol-upgrade (websocket) relaying.
//!
//! # Data Flow
//! ```text
//! client ──upgrade request──▶ relay
//!     → take OnUpgrade handle (500 if the server cannot hand over the socket)
//!     → dial target, TLS when https (404 on failure)
//!     → replay request line, Host, headers, blank line (500 on failure)
//!     → read target response head (502 if unreadable)
//!     → 101: respond 101, then splice client ⇄ target on a spawned task
//!     → otherwise: relay the rejection and drop the target connection
//! ```

use std::io;

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, HOST, TRANSFER_ENCODING, UPGRADE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode};
use axum::response::Response;
use bytes::{BufMut, Bytes, BytesMut};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_rustls::TlsConnector;

use crate::http::response::plain_error;
use crate::net::{dial, BoxedStream, TunnelTracker};
use crate::plugin::Exchange;
use crate::relay::transfer::transfer;

const MAX_HEAD_SIZE: usize = 64 * 1024;
const MAX_HEADERS: usize = 100;

/// Failure while replaying the client request to the target.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Could not write the WS request: {0}")]
    RequestLine(#[source] io::Error),

    #[error("Could not write the WS header: {0}")]
    Headers(#[source] io::Error),

    #[error("Could not write the final header line: {0}")]
    Terminator(#[source] io::Error),
}

/// Response status line and headers read back from the target.
#[derive(Debug)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// True when the request asks to switch to websocket.
pub fn is_upgrade_request<B>(request: &Request<B>) -> bool {
    request
        .headers()
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"))
}

/// Relay a rewritten upgrade request. Always services the request.
pub async fn relay_upgrade(
    exchange: &mut Exchange,
    tls: &TlsConnector,
    tunnels: &TunnelTracker,
) -> bool {
    let Some(on_upgrade) = exchange.request_mut().extensions_mut().remove::<OnUpgrade>() else {
        tracing::warn!("Server connection does not support hijacking");
        exchange.respond(plain_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Does not support hijacking",
        ));
        return true;
    };

    let uri = exchange.request().uri().clone();
    let host = uri.authority().map(|a| a.as_str()).unwrap_or_default().to_string();
    let replay = ReplayHead::from_request(exchange.request());
    tracing::info!(url = %uri, "Upgrading to websocket");

    let mut target = match dial(&uri, tls).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(host = %host, error = %e, "Error setting up target websocket");
            exchange.respond(plain_error(
                StatusCode::NOT_FOUND,
                format!("Could not dial connect {}: {}", host, e),
            ));
            return true;
        }
    };

    if let Err(e) = replay.write_to(&mut target).await {
        tracing::error!(host = %host, error = %e, "Could not replay request to target");
        exchange.respond(plain_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{} ({})", e, host),
        ));
        return true;
    }

    let (head, leftover) = match read_response_head(&mut target).await {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::error!(host = %host, error = %e, "Could not read the upgrade response");
            exchange.respond(plain_error(
                StatusCode::BAD_GATEWAY,
                "Could not read the upgrade response",
            ));
            return true;
        }
    };

    if head.status != StatusCode::SWITCHING_PROTOCOLS {
        tracing::warn!(host = %host, status = %head.status, "Target refused the upgrade");
        exchange.respond(relay_rejection(head, leftover, target).await);
        return true;
    }

    let mut response = Response::new(Body::empty());
    *response.status_mut() = head.status;
    *response.headers_mut() = head.headers;
    exchange.respond(response);

    let guard = tunnels.track();
    tokio::spawn(async move {
        let mut client = match on_upgrade.await {
            Ok(upgraded) => TokioIo::new(upgraded),
            Err(e) => {
                tracing::error!(tunnel = %guard.id(), error = %e, "Cannot hijack connection");
                return;
            }
        };

        if !leftover.is_empty() {
            if let Err(e) = client.write_all(&leftover).await {
                tracing::error!(
                    tunnel = %guard.id(),
                    error = %e,
                    "Could not forward buffered target bytes"
                );
                return;
            }
        }

        tracing::debug!(tunnel = %guard.id(), host = %host, "Tunnel established");
        let stats = transfer(target, client).await;
        tracing::info!(
            tunnel = %guard.id(),
            host = %host,
            target_to_client = stats.a_to_b,
            client_to_target = stats.b_to_a,
            "Tunnel closed"
        );
    });

    true
}

/// The upgrade request as it is replayed to the target, serialized up front
/// so nothing borrowed from the inbound request is held across I/O.
#[derive(Debug, Clone)]
pub struct ReplayHead {
    request_line: Bytes,
    headers: Bytes,
}

impl ReplayHead {
    /// Request line and `Host`, then every other header.
    pub fn from_request<B>(request: &Request<B>) -> Self {
        let host = request
            .headers()
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| request.uri().authority().map(|a| a.to_string()))
            .unwrap_or_default();

        let request_line = format!(
            "{} {} {:?}\r\nHost: {}\r\n",
            request.method(),
            request.uri(),
            request.version(),
            host
        );

        Self {
            request_line: Bytes::from(request_line),
            headers: serialize_headers(request.headers()),
        }
    }

    /// Write the request line, the header block and the blank line.
    pub async fn write_to<S>(&self, stream: &mut S) -> Result<(), ReplayError>
    where
        S: AsyncWrite + Unpin,
    {
        stream
            .write_all(&self.request_line)
            .await
            .map_err(ReplayError::RequestLine)?;

        stream
            .write_all(&self.headers)
            .await
            .map_err(ReplayError::Headers)?;

        stream.write_all(b"\r\n").await.map_err(ReplayError::Terminator)?;
        stream.flush().await.map_err(ReplayError::Terminator)
    }
}

/// One `name: value\r\n` line per header value, `Host` excluded.
fn serialize_headers(headers: &HeaderMap) -> Bytes {
    let mut block = BytesMut::new();
    for (name, value) in headers {
        if name == HOST {
            continue;
        }
        block.put_slice(name.as_str().as_bytes());
        block.put_slice(b": ");
        block.put_slice(value.as_bytes());
        block.put_slice(b"\r\n");
    }
    block.freeze()
}

/// Read an HTTP/1 response head. Returns it along with any bytes read past it.
pub async fn read_response_head<S>(stream: &mut S) -> io::Result<(ResponseHead, Bytes)>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        if stream.read_buf(&mut buf).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "target closed before sending a response",
            ));
        }

        if let Some((len, head)) = parse_head(&buf)? {
            let leftover = buf.split_off(len).freeze();
            return Ok((head, leftover));
        }

        if buf.len() > MAX_HEAD_SIZE {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "response head too large"));
        }
    }
}

fn parse_head(buf: &[u8]) -> io::Result<Option<(usize, ResponseHead)>> {
    let mut header_slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = httparse::Response::new(&mut header_slots);

    let len = match response.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
    };

    let status = response
        .code
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "invalid status code"))?;

    let mut headers = HeaderMap::with_capacity(response.headers.len());
    for header in response.headers.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let value = HeaderValue::from_bytes(header.value)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        headers.append(name, value);
    }

    Ok(Some((len, ResponseHead { status, headers })))
}

/// Relay a refused handshake: status, headers, and a `Content-Length`-bounded body.
async fn relay_rejection(mut head: ResponseHead, leftover: Bytes, target: BoxedStream) -> Response {
    let length = head
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0);
    head.headers.remove(TRANSFER_ENCODING);

    let mut body = Vec::new();
    let mut reader = (&leftover[..]).chain(target).take(length);
    if let Err(e) = reader.read_to_end(&mut body).await {
        tracing::warn!(error = %e, "Could not read the rejection body");
    }
    head.headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = head.status;
    *response.headers_mut() = head.headers;
    response
}
