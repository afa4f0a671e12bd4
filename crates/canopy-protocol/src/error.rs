use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The peer closed the stream between frames.
    #[error("peer closed the connection")]
    PeerClosed,

    #[error("version mismatch: local {local:#010x}, remote {remote:#010x}")]
    VersionMismatch { local: u32, remote: u32 },

    #[error("framing error: {0}")]
    Framing(String),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// An error-status response; carries the server's message.
    #[error("remote error: {0}")]
    Remote(String),

    #[error("invalid endpoint {uri:?}: {reason}")]
    InvalidEndpoint { uri: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether this error means the transport is gone (as opposed to a
    /// protocol-level failure on a live connection).
    pub fn is_peer_closed(&self) -> bool {
        match self {
            Self::PeerClosed => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
