//! Raw outbound connections to the relay target.

use std::io;

use axum::http::uri::{Authority, Scheme};
use axum::http::Uri;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

/// A duplex byte stream to the target, plain or encrypted.
pub trait RawStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> RawStream for T {}

pub type BoxedStream = Box<dyn RawStream>;

/// Open a raw connection to the authority of `uri`.
///
/// `https` URIs are dialed over TLS using `tls`; anything else is plain TCP.
/// Without an explicit port the scheme's default port is used.
pub async fn dial(uri: &Uri, tls: &TlsConnector) -> io::Result<BoxedStream> {
    let authority = uri
        .authority()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "request has no target host"))?;
    let encrypted = uri.scheme() == Some(&Scheme::HTTPS);
    let host = bare_host(authority);
    let port = authority
        .port_u16()
        .unwrap_or(if encrypted { 443 } else { 80 });

    let tcp = TcpStream::connect((host, port)).await?;
    tcp.set_nodelay(true)?;

    if !encrypted {
        return Ok(Box::new(tcp));
    }

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let stream = tls.connect(server_name, tcp).await?;
    Ok(Box::new(stream))
}

/// Host without port or IPv6 brackets.
fn bare_host(authority: &Authority) -> &str {
    authority
        .host()
        .trim_start_matches('[')
        .trim_end_matches(']')
}
