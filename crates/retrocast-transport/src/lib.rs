//! Media fan-out to viewers.
//!
//! The [`Broadcaster`] hands every captured frame and audio chunk to the
//! sinks registered for a session through single-slot mailboxes, so the
//! capture thread never waits on a viewer. Pub/sub sinks are drained by
//! WebSocket tasks that encode PNG stills; peer sinks are drained by the
//! [`PeerTransport`] pump that feeds WebRTC tracks.

mod broadcast;
mod error;
mod mailbox;
mod peer;
mod pubsub;

pub use broadcast::{Broadcaster, MediaSink, PublishStats, SinkId, SinkItem, SinkKind};
pub use error::TransportError;
pub use mailbox::Mailbox;
pub use peer::{transition, CandidateBuffer, PeerInput, PeerTransport, PeerTransportConfig};
pub use pubsub::{audio_event, frame_event};

use std::time::Duration;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Label of the inbound input data channel.
pub const INPUT_CHANNEL_LABEL: &str = "input";

/// Clock rate of H.264 RTP payloads.
pub const VIDEO_CLOCK_RATE: u32 = 90_000;

/// Nominal duration of one video sample (one capture tick).
pub const VIDEO_SAMPLE_DURATION: Duration = Duration::from_nanos(16_666_667);

/// Capacity of the channel carrying peer input to the engine.
pub const PEER_INPUT_CHANNEL_CAPACITY: usize = 256;
