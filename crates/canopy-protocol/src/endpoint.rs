//! Transport endpoints parsed from URIs.
//!
//! Recognized schemes: `tcp://host:port`, `tcp+tls://host:port` (hostname
//! verified against the URI host by the TLS layer), and
//! `unix://<socket-path>`.

use std::fmt;
use std::path::PathBuf;

use url::Url;

use crate::error::{ProtocolError, ProtocolResult};

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 8888;

/// A parsed transport endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Tcp {
        host: String,
        port: u16,
        tls: bool,
    },
    Unix {
        path: PathBuf,
    },
}

impl Endpoint {
    /// Parse an endpoint URI.
    pub fn parse(uri: &str) -> ProtocolResult<Self> {
        let invalid = |reason: &str| ProtocolError::InvalidEndpoint {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };
        let url = Url::parse(uri).map_err(|e| ProtocolError::InvalidEndpoint {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "tcp" | "tcp+tls" => {
                let host = url
                    .host_str()
                    .filter(|host| !host.is_empty())
                    .ok_or_else(|| invalid("missing host"))?
                    .to_string();
                Ok(Self::Tcp {
                    host,
                    port: url.port().unwrap_or(DEFAULT_PORT),
                    tls: url.scheme() == "tcp+tls",
                })
            }
            "unix" => {
                let path = url.path();
                if path.is_empty() || path == "/" {
                    return Err(invalid("missing socket path"));
                }
                Ok(Self::Unix {
                    path: PathBuf::from(path),
                })
            }
            other => Err(invalid(&format!("unsupported scheme {other:?}"))),
        }
    }

    /// Whether this endpoint requires TLS.
    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tcp { tls: true, .. })
    }

    /// Force TLS on (used by client configs carrying a separate `tls`
    /// flag). A no-op for Unix endpoints.
    pub fn with_tls(self) -> Self {
        match self {
            Self::Tcp { host, port, .. } => Self::Tcp {
                host,
                port,
                tls: true,
            },
            unix => unix,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port, tls } => {
                let scheme = if *tls { "tcp+tls" } else { "tcp" };
                write!(f, "{scheme}://{host}:{port}")
            }
            Self::Unix { path } => write!(f, "unix://{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tcp() {
        let ep = Endpoint::parse("tcp://127.0.0.1:9000").unwrap();
        assert_eq!(
            ep,
            Endpoint::Tcp {
                host: "127.0.0.1".into(),
                port: 9000,
                tls: false
            }
        );
    }

    #[test]
    fn parse_tcp_default_port() {
        let ep = Endpoint::parse("tcp://example.com").unwrap();
        assert_eq!(
            ep,
            Endpoint::Tcp {
                host: "example.com".into(),
                port: DEFAULT_PORT,
                tls: false
            }
        );
    }

    #[test]
    fn parse_tls() {
        let ep = Endpoint::parse("tcp+tls://example.com:8888").unwrap();
        assert!(ep.is_tls());
    }

    #[test]
    fn parse_unix() {
        let ep = Endpoint::parse("unix:///tmp/canopy.sock").unwrap();
        assert_eq!(
            ep,
            Endpoint::Unix {
                path: "/tmp/canopy.sock".into()
            }
        );
    }

    #[test]
    fn reject_unknown_scheme() {
        assert!(Endpoint::parse("http://example.com").is_err());
    }

    #[test]
    fn reject_missing_host() {
        assert!(Endpoint::parse("tcp://").is_err());
    }

    #[test]
    fn reject_missing_socket_path() {
        assert!(Endpoint::parse("unix://").is_err());
    }

    #[test]
    fn with_tls_upgrades_tcp() {
        let ep = Endpoint::parse("tcp://h:1").unwrap().with_tls();
        assert!(ep.is_tls());
        let unix = Endpoint::parse("unix:///s").unwrap().with_tls();
        assert!(!unix.is_tls());
    }

    #[test]
    fn display_roundtrip() {
        for uri in ["tcp://h:9000", "tcp+tls://h:8888", "unix:///tmp/x.sock"] {
            let ep = Endpoint::parse(uri).unwrap();
            assert_eq!(Endpoint::parse(&ep.to_string()).unwrap(), ep);
        }
    }
}
