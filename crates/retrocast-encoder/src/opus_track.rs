//! Opus audio encoder.

use bytes::Bytes;
use tracing::{debug, error};

use crate::error::EncoderError;
use crate::{AudioEncoder, AudioEncoderConfig, EncodedAudioPacket, EncoderResult};

/// Largest packet libopus will produce.
const MAX_PACKET: usize = 4000;

/// Opus encoder for interleaved `i16` audio in 20 ms packets.
pub struct OpusEncoder {
    encoder: opus::Encoder,
    channels: usize,
    output: Vec<u8>,
}

impl OpusEncoder {
    /// Create a new Opus encoder.
    pub fn new(config: AudioEncoderConfig) -> EncoderResult<Self> {
        let channels = match config.channels {
            1 => opus::Channels::Mono,
            2 => opus::Channels::Stereo,
            n => {
                return Err(EncoderError::InvalidInput(format!(
                    "Opus supports 1 or 2 channels, got {}",
                    n
                )))
            }
        };

        let mut encoder =
            opus::Encoder::new(config.sample_rate, channels, opus::Application::LowDelay)
                .map_err(|e| {
                    EncoderError::Initialization(format!("Failed to create Opus encoder: {}", e))
                })?;
        encoder
            .set_bitrate(opus::Bitrate::Bits(config.bitrate_kbps as i32 * 1000))
            .map_err(|e| EncoderError::Initialization(format!("Opus bitrate rejected: {}", e)))?;

        debug!(
            sample_rate = config.sample_rate,
            channels = config.channels,
            bitrate_kbps = config.bitrate_kbps,
            "Opus encoder initialized"
        );

        Ok(Self {
            encoder,
            channels: config.channels as usize,
            output: vec![0u8; MAX_PACKET],
        })
    }
}

impl AudioEncoder for OpusEncoder {
    fn encode(&mut self, samples: &[i16]) -> EncoderResult<EncodedAudioPacket> {
        let len = self.encoder.encode(samples, &mut self.output).map_err(|e| {
            error!("Opus encode error: {}", e);
            EncoderError::Encoding(format!("Opus encode error: {}", e))
        })?;

        Ok(EncodedAudioPacket {
            data: Bytes::copy_from_slice(&self.output[..len]),
            frames: samples.len() / self.channels,
        })
    }

    fn name(&self) -> &'static str {
        "opus"
    }
}
