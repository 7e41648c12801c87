//! Signaling messages exchanged with viewers.

use serde::{Deserialize, Serialize};

use crate::error::ErrorBody;
use crate::state::PeerState;
use crate::types::{PeerSessionId, SessionId};

/// A session description (offer or answer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// `offer` or `answer`.
    #[serde(rename = "type")]
    pub kind: String,

    /// SDP body.
    pub sdp: String,
}

/// A trickled network candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// Requests a viewer sends over the signaling channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalingRequest {
    /// Open a peer session bound to a game session.
    #[serde(rename_all = "camelCase")]
    CreateSession { game_session_id: SessionId },

    /// Apply the viewer's answer.
    #[serde(rename_all = "camelCase")]
    Answer {
        session_id: PeerSessionId,
        answer: SessionDescription,
    },

    /// Apply a remote candidate.
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        session_id: PeerSessionId,
        candidate: IceCandidate,
    },

    /// Close a peer session.
    #[serde(rename_all = "camelCase")]
    CloseSession { session_id: PeerSessionId },
}

/// A request with an optional client-chosen correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalingEnvelope {
    #[serde(default)]
    pub request_id: Option<u64>,

    #[serde(flatten)]
    pub request: SignalingRequest,
}

/// Reply to one signaling request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalingReply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<PeerSessionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offer: Option<SessionDescription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl SignalingReply {
    /// A bare success reply.
    pub fn ok(request_id: Option<u64>) -> Self {
        Self {
            request_id,
            success: true,
            ..Default::default()
        }
    }

    /// Success reply for a freshly created peer session.
    pub fn created(request_id: Option<u64>, session_id: PeerSessionId, offer: SessionDescription) -> Self {
        Self {
            request_id,
            success: true,
            session_id: Some(session_id),
            offer: Some(offer),
            error: None,
        }
    }

    /// Failure reply.
    pub fn failed(request_id: Option<u64>, error: ErrorBody) -> Self {
        Self {
            request_id,
            success: false,
            error: Some(error),
            ..Default::default()
        }
    }
}

/// Events pushed to a viewer without a preceding request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalingEvent {
    /// A local candidate was gathered.
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        session_id: PeerSessionId,
        candidate: IceCandidate,
    },

    /// The peer session changed signaling state.
    #[serde(rename_all = "camelCase")]
    PeerState {
        session_id: PeerSessionId,
        state: PeerState,
    },
}
