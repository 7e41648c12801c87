//! Peer session state machine.

use retrocast_ipc::PeerState;

use crate::{TransportError, TransportResult};

/// Validate a transition and return the new state.
///
/// ```text
/// Idle -> Offering -> AwaitingAnswer -> Connected <-> Disconnected
///   any non-closed state -> Closed
/// ```
pub fn transition(from: PeerState, to: PeerState) -> TransportResult<PeerState> {
    use PeerState::*;

    let allowed = match (from, to) {
        (Closed, _) => false,
        (_, Closed) => true,
        (Idle, Offering)
        | (Offering, AwaitingAnswer)
        | (AwaitingAnswer, Connected)
        | (Connected, Disconnected)
        | (Disconnected, Connected) => true,
        _ => false,
    };

    if allowed {
        Ok(to)
    } else {
        Err(TransportError::IllegalTransition { from, to })
    }
}
