use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Endpoint URI to bind: `tcp://host:port` or `unix://path`.
    pub uri: String,
    /// TLS material for a fronting terminator. This build does not
    /// terminate TLS itself.
    pub tls: Option<TlsConfig>,
    /// Backend-specific: expose a lower storage layer.
    pub with_lower_layer: bool,
    /// Port for the auxiliary GraphQL interface, when one is deployed
    /// alongside the native protocol.
    pub graphql_port: Option<u16>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            uri: format!("tcp://127.0.0.1:{}", canopy_protocol::DEFAULT_PORT),
            tls: None,
            with_lower_layer: false,
            graphql_port: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}
