//! Endpoint descriptions — what gets probed.
//!
//! An [`EndpointSpec`] is immutable after construction. URL targets are
//! parsed up front; bare host:port targets are DNS-resolved exactly once, at
//! construction, so a monitor never starts with a partially-invalid list.

use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

use thiserror::Error;

/// Errors raised while constructing an [`EndpointSpec`].
///
/// These are fatal to that one endpoint and surface synchronously, before
/// any monitoring starts.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("cannot resolve {host}:{port}: {source}")]
    Unresolvable {
        host: String,
        port: u16,
        source: io::Error,
    },
}

/// What a probe connects to.
#[derive(Debug, Clone)]
pub enum Target {
    /// An HTTP(S) URL; probed with a GET, live iff the status is exactly 200.
    Http(http::Uri),
    /// A resolved socket address; probed with a bare TCP connect.
    Tcp(SocketAddr),
}

/// One monitored network target.
#[derive(Debug, Clone)]
pub struct EndpointSpec {
    name: String,
    target: Target,
    /// host:port the probe dials. Derived once at construction.
    probe_addr: String,
}

impl EndpointSpec {
    /// Build an HTTP(S) endpoint from a URL string. The logical name is the
    /// URL's host component.
    pub fn from_url(url: &str) -> Result<Self, EndpointError> {
        let uri: http::Uri = url.parse().map_err(|e: http::uri::InvalidUri| {
            EndpointError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;

        let default_port = match uri.scheme_str() {
            Some("http") => 80,
            Some("https") => 443,
            other => {
                return Err(EndpointError::InvalidUrl {
                    url: url.to_string(),
                    reason: format!("unsupported scheme {:?}", other.unwrap_or("")),
                });
            }
        };
        let host = uri
            .host()
            .ok_or_else(|| EndpointError::InvalidUrl {
                url: url.to_string(),
                reason: "missing host".to_string(),
            })?
            .to_string();
        let port = uri.port_u16().unwrap_or(default_port);

        Ok(Self {
            probe_addr: format!("{host}:{port}"),
            name: host,
            target: Target::Http(uri),
        })
    }

    /// Build a raw TCP endpoint from a host name and port, resolving the
    /// name immediately. No connection is attempted here.
    pub fn resolve(host: &str, port: u16) -> Result<Self, EndpointError> {
        let mut addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| EndpointError::Unresolvable {
                host: host.to_string(),
                port,
                source: e,
            })?;
        let addr = addrs.next().ok_or_else(|| EndpointError::Unresolvable {
            host: host.to_string(),
            port,
            source: io::Error::new(io::ErrorKind::NotFound, "no addresses returned"),
        })?;

        Ok(Self {
            name: host.to_string(),
            target: Target::Tcp(addr),
            probe_addr: addr.to_string(),
        })
    }

    /// Logical name used in logs and events.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// The host:port a probe connects to.
    pub fn probe_addr(&self) -> &str {
        &self.probe_addr
    }
}

impl fmt::Display for EndpointSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Target::Http(uri) => write!(f, "{uri}"),
            Target::Tcp(addr) => write!(f, "{addr}"),
        }
    }
}
