//! Relay target resolution.
//!
//! Turns the configured target URL into an immutable [`RelayTarget`]. The
//! header values the rewriter needs are computed here once so that rewriting
//! a request can never fail.

use std::fmt;
use std::str::FromStr;

use axum::http::uri::{Authority, Scheme};
use axum::http::HeaderValue;
use thiserror::Error;
use url::Url;

/// Errors produced while resolving a target URL.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("relay target is not set")]
    Missing,

    #[error("relay target {url:?} is not a valid URL: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("relay target scheme {0:?} is not supported")]
    UnsupportedScheme(String),

    #[error("relay target {0:?} has no host")]
    MissingHost(String),

    #[error("relay target host {0:?} is not a valid authority")]
    InvalidHost(String),
}

/// Transport used to reach the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetScheme {
    Plain,
    Encrypted,
}

impl TargetScheme {
    fn from_url_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "http" | "ws" => Some(Self::Plain),
            "https" | "wss" => Some(Self::Encrypted),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "http",
            Self::Encrypted => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Self::Plain => 80,
            Self::Encrypted => 443,
        }
    }
}

impl From<TargetScheme> for Scheme {
    fn from(scheme: TargetScheme) -> Self {
        match scheme {
            TargetScheme::Plain => Scheme::HTTP,
            TargetScheme::Encrypted => Scheme::HTTPS,
        }
    }
}

impl fmt::Display for TargetScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single upstream every request is relayed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayTarget {
    scheme: TargetScheme,
    host: Authority,
    host_header: HeaderValue,
    origin: HeaderValue,
}

impl RelayTarget {
    /// Resolve a target from a URL such as `https://10.0.0.7:8443`.
    ///
    /// Only the scheme and `host[:port]` are kept; path and query are ignored.
    pub fn parse(raw: &str) -> Result<Self, TargetError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(TargetError::Missing);
        }

        let url = Url::parse(raw).map_err(|source| TargetError::InvalidUrl {
            url: raw.to_string(),
            source,
        })?;

        let scheme = TargetScheme::from_url_scheme(url.scheme())
            .ok_or_else(|| TargetError::UnsupportedScheme(url.scheme().to_string()))?;

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host,
            _ => return Err(TargetError::MissingHost(raw.to_string())),
        };
        let host = match url.port().or_else(|| explicit_port(raw)) {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let authority =
            Authority::from_str(&host).map_err(|_| TargetError::InvalidHost(host.clone()))?;
        let host_header =
            HeaderValue::from_str(&host).map_err(|_| TargetError::InvalidHost(host.clone()))?;
        let origin = HeaderValue::from_str(&format!("{}://{}/", scheme, host))
            .map_err(|_| TargetError::InvalidHost(host.clone()))?;

        Ok(Self {
            scheme,
            host: authority,
            host_header,
            origin,
        })
    }

    pub fn scheme(&self) -> TargetScheme {
        self.scheme
    }

    /// `host[:port]` exactly as configured.
    pub fn host(&self) -> &Authority {
        &self.host
    }

    pub fn host_header(&self) -> &HeaderValue {
        &self.host_header
    }

    /// `{scheme}://{host}/`
    pub fn origin(&self) -> &HeaderValue {
        &self.origin
    }
}

/// Port as written in `raw`. `Url` drops a port equal to the scheme default,
/// but the configured `host:port` is what goes into `Host` and `Origin`.
fn explicit_port(raw: &str) -> Option<u16> {
    let rest = raw.split_once("://")?.1;
    let end = rest.find(|c: char| matches!(c, '/' | '?' | '#')).unwrap_or(rest.len());
    let authority = &rest[..end];
    let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    Authority::from_str(authority).ok()?.port_u16()
}

impl FromStr for RelayTarget {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RelayTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)
    }
}
