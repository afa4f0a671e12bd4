use canopy_protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with an error-status response.
    #[error("server error: {0}")]
    Remote(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("configuration error: {0}")]
    Config(String),

    /// A tree value from a previous session of this client was used after
    /// a reconnect (or explicit close) invalidated its server handle.
    #[error("tree handle belongs to a closed session")]
    StaleTree,
}

impl ClientError {
    /// Whether the underlying transport is gone.
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, Self::Protocol(e) if e.is_peer_closed())
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
