use canopy_protocol::ProtocolError;
use canopy_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// A client referenced a tree handle this session never allocated (or
    /// already released).
    #[error("unknown tree handle: {0}")]
    UnknownTree(u64),

    /// The session already carries a watch of this flavor.
    #[error("watch already installed")]
    WatchExists,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Recoverable errors are reported to the client on a live session;
    /// everything else tears the session down.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnknownTree(_) | Self::WatchExists | Self::Store(_)
        )
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_errors_are_recoverable() {
        assert!(ServerError::UnknownTree(7).is_recoverable());
        assert!(ServerError::WatchExists.is_recoverable());
        assert!(ServerError::Store(StoreError::MergeConflict {
            path: "a/b".into()
        })
        .is_recoverable());
    }

    #[test]
    fn transport_errors_are_fatal() {
        assert!(!ServerError::Protocol(ProtocolError::PeerClosed).is_recoverable());
        assert!(!ServerError::Config("bad uri".into()).is_recoverable());
    }
}
