//! Error types for the audio module.

use thiserror::Error;

/// Errors that can occur during audio processing.
#[derive(Debug, Error)]
pub enum AudioError {
    /// A sample rate of zero was supplied.
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    /// A channel count of zero was supplied.
    #[error("Invalid channel count: {0}")]
    InvalidChannels(u16),

    /// Sample count is not a multiple of the channel count.
    #[error("{samples} samples do not divide into {channels} channels")]
    MisalignedSamples { samples: usize, channels: u16 },
}
