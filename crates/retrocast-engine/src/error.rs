//! Engine error types.

use retrocast_ipc::ErrorKind;
use retrocast_transport::TransportError;
use thiserror::Error;

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session already running: {0}")]
    AlreadyRunning(String),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Failed to load core: {0}")]
    CoreLoadFailed(String),

    #[error("Failed to load game: {0}")]
    GameLoadFailed(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable kind reported to clients.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyRunning(_) => ErrorKind::AlreadyRunning,
            Self::SourceUnavailable(_) => ErrorKind::SourceUnavailable,
            Self::CoreLoadFailed(_) => ErrorKind::CoreLoadFailed,
            Self::GameLoadFailed(_) => ErrorKind::GameLoadFailed,
            Self::Transport(e) => e.kind(),
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(EngineError::NotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            EngineError::AlreadyRunning("x".into()).kind(),
            ErrorKind::AlreadyRunning
        );
        assert_eq!(
            EngineError::Transport(TransportError::PeerNotFound("p".into())).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            EngineError::Transport(TransportError::NegotiationFailed("bad".into())).kind(),
            ErrorKind::NegotiationFailed
        );
    }
}
