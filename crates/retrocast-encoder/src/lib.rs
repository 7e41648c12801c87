//! Media format conversion and encoding.
//!
//! This crate converts RGBA frames to I420 for video tracks, encodes PNG
//! stills for pub/sub viewers, and wraps the H.264 (x264) and Opus encoders
//! used by peer tracks. The track encoders are default features; a build
//! with `--no-default-features` leaves them out and the factories return
//! [`EncoderError::NotSupported`].

mod error;
#[cfg(feature = "h264")]
mod h264;
mod i420;
#[cfg(feature = "opus")]
mod opus_track;
mod png;

pub use error::EncoderError;
pub use i420::{i420_buffer_size, rgba_to_i420};
#[cfg(feature = "opus")]
pub use opus_track::OpusEncoder;
pub use png::encode_png;
#[cfg(feature = "h264")]
pub use h264::X264Encoder;

use bytes::Bytes;

/// Result type for encoder operations.
pub type EncoderResult<T> = Result<T, EncoderError>;

/// Video encoding configuration.
#[derive(Debug, Clone)]
pub struct VideoEncoderConfig {
    /// Width in pixels.
    pub width: u32,

    /// Height in pixels.
    pub height: u32,

    /// Target frames per second.
    pub fps: u32,

    /// Target bitrate in kbps.
    pub bitrate_kbps: u32,

    /// Keyframe interval in seconds.
    pub keyframe_interval_secs: u32,
}

impl Default for VideoEncoderConfig {
    fn default() -> Self {
        Self {
            width: 240,
            height: 160,
            fps: 60,
            bitrate_kbps: 1500,
            keyframe_interval_secs: 2,
        }
    }
}

/// Audio encoding configuration.
#[derive(Debug, Clone)]
pub struct AudioEncoderConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,

    /// Number of channels.
    pub channels: u16,

    /// Target bitrate in kbps.
    pub bitrate_kbps: u32,
}

impl Default for AudioEncoderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            bitrate_kbps: 96,
        }
    }
}

/// An encoded video access unit (Annex-B NAL units).
#[derive(Debug, Clone)]
pub struct EncodedVideoPacket {
    /// Encoded NAL data.
    pub data: Bytes,

    /// Presentation timestamp in 100ns units.
    pub pts_100ns: u64,

    /// Whether this is a keyframe.
    pub is_keyframe: bool,
}

/// An encoded audio packet.
#[derive(Debug, Clone)]
pub struct EncodedAudioPacket {
    /// Encoded Opus data.
    pub data: Bytes,

    /// Samples per channel covered by this packet.
    pub frames: usize,
}

/// Trait for video encoders.
pub trait VideoEncoder: Send {
    /// Encode a frame in I420 format.
    fn encode(&mut self, frame: &[u8], pts_100ns: u64)
        -> EncoderResult<Option<EncodedVideoPacket>>;

    /// Frame dimensions this encoder was configured for.
    fn dimensions(&self) -> (u32, u32);

    /// Get encoder name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Trait for audio encoders.
pub trait AudioEncoder: Send {
    /// Encode one packet of interleaved samples.
    fn encode(&mut self, samples: &[i16]) -> EncoderResult<EncodedAudioPacket>;

    /// Get encoder name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Create an H.264 video encoder.
#[cfg(feature = "h264")]
pub fn create_video_encoder(config: VideoEncoderConfig) -> EncoderResult<Box<dyn VideoEncoder>> {
    let encoder = X264Encoder::new(config)?;
    tracing::info!("Using x264 software encoder");
    Ok(Box::new(encoder))
}

/// Create a video encoder (stub when H.264 support is compiled out).
#[cfg(not(feature = "h264"))]
pub fn create_video_encoder(_config: VideoEncoderConfig) -> EncoderResult<Box<dyn VideoEncoder>> {
    Err(EncoderError::NotSupported(
        "H.264 encoding requires the `h264` feature".into(),
    ))
}

/// Create an Opus audio encoder.
#[cfg(feature = "opus")]
pub fn create_audio_encoder(config: AudioEncoderConfig) -> EncoderResult<Box<dyn AudioEncoder>> {
    let encoder = OpusEncoder::new(config)?;
    Ok(Box::new(encoder))
}

/// Create an audio encoder (stub when Opus support is compiled out).
#[cfg(not(feature = "opus"))]
pub fn create_audio_encoder(_config: AudioEncoderConfig) -> EncoderResult<Box<dyn AudioEncoder>> {
    Err(EncoderError::NotSupported(
        "Opus encoding requires the `opus` feature".into(),
    ))
}
