//! Events emitted by the engine to observers.

use serde::{Deserialize, Serialize};

use crate::state::{PeerState, SessionState};
use crate::types::{PeerSessionId, SessionId, StreamMode};

/// Events that the engine broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// A game session changed lifecycle state.
    SessionStateChanged {
        session_id: SessionId,
        previous: SessionState,
        current: SessionState,
    },

    /// A game session left the registry.
    SessionRemoved { session_id: SessionId },

    /// Media of a game session now goes to a different set of transports.
    StreamModeChanged {
        session_id: SessionId,
        previous: StreamMode,
        current: StreamMode,
    },

    /// A peer session changed signaling state.
    PeerStateChanged {
        peer_id: PeerSessionId,
        game_session_id: SessionId,
        state: PeerState,
    },
}
