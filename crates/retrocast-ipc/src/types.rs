//! Common types used across engine, transports and the control surface.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::SessionState;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh, unique identifier.
            pub fn generate() -> Self {
                Self(format!("{}{}", $prefix, uuid::Uuid::new_v4().simple()))
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

opaque_id!(
    /// Identifier of a game session.
    SessionId,
    ""
);

opaque_id!(
    /// Identifier of a peer (viewer) session.
    PeerSessionId,
    "peer_"
);

opaque_id!(
    /// Identifier of one viewer's signaling connection.
    ViewerId,
    "viewer_"
);

/// Which transports receive a session's media.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamMode {
    /// Publish/subscribe fan-out only.
    #[default]
    #[serde(rename = "websocket", alias = "pubsub")]
    PubSub,

    /// Peer-to-peer real-time transport only.
    #[serde(rename = "webrtc", alias = "peer")]
    Peer,

    /// Both transports.
    #[serde(rename = "both")]
    Both,
}

impl StreamMode {
    /// Returns true if pub/sub sinks receive media in this mode.
    pub fn includes_pubsub(self) -> bool {
        matches!(self, Self::PubSub | Self::Both)
    }

    /// Returns true if peer sinks receive media in this mode.
    pub fn includes_peer(self) -> bool {
        matches!(self, Self::Peer | Self::Both)
    }

    /// Wire name of this mode.
    pub fn name(self) -> &'static str {
        match self {
            Self::PubSub => "websocket",
            Self::Peer => "webrtc",
            Self::Both => "both",
        }
    }
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a stream mode name is not recognized.
#[derive(Debug, Error)]
#[error("Unknown stream mode: {0}")]
pub struct ParseStreamModeError(pub String);

impl FromStr for StreamMode {
    type Err = ParseStreamModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "websocket" | "pubsub" => Ok(Self::PubSub),
            "webrtc" | "peer" => Ok(Self::Peer),
            "both" => Ok(Self::Both),
            _ => Err(ParseStreamModeError(s.to_string())),
        }
    }
}

/// Per-session counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetrics {
    /// Ticks completed since start.
    pub ticks: u64,

    /// Ticks that failed.
    pub tick_failures: u64,

    /// Frames handed to the broadcast layer.
    pub frames_published: u64,

    /// Audio chunks handed to the broadcast layer.
    pub audio_chunks_published: u64,

    /// Items overwritten in sink mailboxes before a consumer took them.
    pub mailbox_drops: u64,

    /// Input events applied to the core.
    pub inputs_applied: u64,

    /// Measured ticks per second since the last report.
    pub tick_rate: f32,

    /// Target ticks per second.
    pub target_tick_rate: f32,

    /// Seconds since the session started running.
    pub uptime_seconds: u64,
}

/// Immutable view of one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub source: String,
    pub state: SessionState,
    pub stream_mode: StreamMode,
    /// Unix time in milliseconds.
    pub created_at_ms: u64,
    pub metrics: SessionMetrics,
}

/// Media event delivered to pub/sub subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamEvent {
    /// One still frame.
    #[serde(rename_all = "camelCase")]
    Frame {
        width: u32,
        height: u32,
        /// Base64 image payload.
        data: String,
        format: String,
        /// Capture time, unix milliseconds.
        timestamp: u64,
    },

    /// One chunk of interleaved PCM.
    #[serde(rename_all = "camelCase")]
    Audio {
        sample_rate: u32,
        channels: u16,
        /// Base64 of little-endian signed 16-bit samples.
        data: String,
        format: String,
        timestamp: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_mode_wire_names() {
        assert_eq!(serde_json::to_string(&StreamMode::PubSub).unwrap(), "\"websocket\"");
        assert_eq!(serde_json::to_string(&StreamMode::Peer).unwrap(), "\"webrtc\"");
        let mode: StreamMode = serde_json::from_str("\"both\"").unwrap();
        assert_eq!(mode, StreamMode::Both);
        let mode: StreamMode = serde_json::from_str("\"peer\"").unwrap();
        assert_eq!(mode, StreamMode::Peer);
    }

    #[test]
    fn test_stream_mode_from_str() {
        assert_eq!("BOTH".parse::<StreamMode>().unwrap(), StreamMode::Both);
        assert_eq!("pubsub".parse::<StreamMode>().unwrap(), StreamMode::PubSub);
        assert!("carrier-pigeon".parse::<StreamMode>().is_err());
    }

    #[test]
    fn test_stream_mode_routing() {
        assert!(StreamMode::PubSub.includes_pubsub());
        assert!(!StreamMode::PubSub.includes_peer());
        assert!(StreamMode::Peer.includes_peer());
        assert!(!StreamMode::Peer.includes_pubsub());
        assert!(StreamMode::Both.includes_peer() && StreamMode::Both.includes_pubsub());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert!(PeerSessionId::generate().as_str().starts_with("peer_"));
    }

    #[test]
    fn test_frame_event_shape() {
        let event = StreamEvent::Frame {
            width: 2,
            height: 2,
            data: "AAAA".into(),
            format: "png".into(),
            timestamp: 7,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "frame");
        assert_eq!(json["width"], 2);
        assert_eq!(json["format"], "png");
    }
}
