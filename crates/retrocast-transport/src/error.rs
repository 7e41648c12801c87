//! Error types for the transport module.

use retrocast_ipc::{ErrorKind, PeerState};
use thiserror::Error;

/// Errors that can occur during transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Unknown peer session.
    #[error("Peer session not found: {0}")]
    PeerNotFound(String),

    /// Offer, answer or candidate could not be applied.
    #[error("Negotiation failed: {0}")]
    NegotiationFailed(String),

    /// The peer state machine refused a transition.
    #[error("Illegal peer transition from {from:?} to {to:?}")]
    IllegalTransition { from: PeerState, to: PeerState },

    /// A pub/sub payload could not be produced.
    #[error("Media encoding failed: {0}")]
    Encoding(#[from] retrocast_encoder::EncoderError),

    /// Underlying WebRTC stack error.
    #[error("WebRTC error: {0}")]
    WebRtc(#[from] webrtc::Error),
}

impl TransportError {
    /// Stable error kind for callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PeerNotFound(_) => ErrorKind::NotFound,
            Self::NegotiationFailed(_) | Self::IllegalTransition { .. } => {
                ErrorKind::NegotiationFailed
            }
            Self::Encoding(_) | Self::WebRtc(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            TransportError::PeerNotFound("peer_x".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            TransportError::IllegalTransition {
                from: PeerState::Closed,
                to: PeerState::Connected
            }
            .kind(),
            ErrorKind::NegotiationFailed
        );
    }
}
