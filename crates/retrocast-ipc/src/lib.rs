//! Typed messages, states and configuration shared across retrocast.
//!
//! This crate defines the vocabulary spoken between the engine, the
//! transports and the outer control surface: identifiers, lifecycle states,
//! wire messages and error kinds.

mod config;
mod error;
mod events;
mod input;
mod signaling;
mod state;
mod types;

pub use config::EngineConfig;
pub use error::{ErrorBody, ErrorKind};
pub use events::EngineEvent;
pub use input::{ButtonState, InputEvent, InputPayload, JoypadButton, ViewerMessage};
pub use signaling::{
    IceCandidate, SessionDescription, SignalingEnvelope, SignalingEvent, SignalingReply,
    SignalingRequest,
};
pub use state::{PeerState, SessionState, StartupPhase, StopReason};
pub use types::{
    ParseStreamModeError, PeerSessionId, SessionId, SessionMetrics, SessionSnapshot, StreamEvent,
    StreamMode, ViewerId,
};

use crossbeam_channel::{Receiver, Sender};

/// Capture ticks per second.
pub const TARGET_TICK_RATE: u32 = 60;

/// Channel capacity for input events (router → capture loop).
pub const INPUT_CHANNEL_CAPACITY: usize = 64;

/// Channel capacity for engine events (engine → observers).
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Creates a bounded input channel for one running session.
pub fn input_channel() -> (Sender<(JoypadButton, bool)>, Receiver<(JoypadButton, bool)>) {
    crossbeam_channel::bounded(INPUT_CHANNEL_CAPACITY)
}
