//! Audio resampling and packetization.
//!
//! Core audio arrives at whatever rate the emulation core runs at (32040 Hz
//! for the GBA). Peer audio tracks run at 48 kHz with fixed 20 ms packets, so
//! chunks are resampled and then re-cut into packets here.

mod error;
mod framer;
mod resample;

pub use error::AudioError;
pub use framer::PacketFramer;
pub use resample::resample_linear;

/// Result type for audio operations.
pub type AudioResult<T> = Result<T, AudioError>;

/// Native sample rate of the GBA core in Hz.
pub const CORE_SAMPLE_RATE: u32 = 32_040;

/// Sample rate of peer audio tracks in Hz.
pub const PEER_SAMPLE_RATE: u32 = 48_000;

/// Number of audio channels.
pub const CHANNELS: u16 = 2;

/// Packet duration for peer audio in milliseconds.
pub const PACKET_MS: u32 = 20;

/// Samples per channel in one peer packet (20ms at 48kHz).
pub const SAMPLES_PER_PACKET: usize = (PEER_SAMPLE_RATE * PACKET_MS / 1000) as usize;
