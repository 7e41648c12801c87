//! x264 software video encoder.

use bytes::Bytes;
use tracing::{debug, instrument, trace};

use crate::error::EncoderError;
use crate::i420::i420_buffer_size;
use crate::{EncodedVideoPacket, EncoderResult, VideoEncoder, VideoEncoderConfig};

/// x264 encoder producing baseline-profile Annex-B access units.
///
/// Zero-latency tuning means every `encode` call returns the access unit for
/// the frame it was given; nothing is held back for a later flush.
pub struct X264Encoder {
    encoder: x264::Encoder,
    config: VideoEncoderConfig,
    frame_count: u64,
}

impl X264Encoder {
    /// Create a new x264 encoder.
    #[instrument(name = "x264_new", skip_all)]
    pub fn new(config: VideoEncoderConfig) -> EncoderResult<Self> {
        debug!(
            width = config.width,
            height = config.height,
            fps = config.fps,
            bitrate_kbps = config.bitrate_kbps,
            "Initializing x264 encoder"
        );

        let keyframe_interval = (config.fps * config.keyframe_interval_secs).max(1);

        // Baseline profile: no B-frames, so every access unit is decodable on arrival.
        let encoder = x264::Setup::preset(x264::Preset::Ultrafast, x264::Tune::None, false, true)
            .fps(config.fps, 1)
            .bitrate(config.bitrate_kbps as i32)
            .max_keyframe_interval(keyframe_interval as i32)
            .scenecut_threshold(0)
            .baseline()
            .build(
                x264::Colorspace::I420,
                config.width as i32,
                config.height as i32,
            )
            .map_err(|e| EncoderError::Initialization(format!("x264 setup failed: {:?}", e)))?;

        debug!("x264 encoder initialized");

        Ok(Self {
            encoder,
            config,
            frame_count: 0,
        })
    }
}

impl VideoEncoder for X264Encoder {
    #[instrument(name = "x264_encode", skip(self, frame))]
    fn encode(
        &mut self,
        frame: &[u8],
        pts_100ns: u64,
    ) -> EncoderResult<Option<EncodedVideoPacket>> {
        let (width, height) = (self.config.width, self.config.height);
        let expected_size = i420_buffer_size(width, height);
        if frame.len() != expected_size {
            return Err(EncoderError::InvalidInput(format!(
                "Expected {} bytes ({}x{} I420), got {}",
                expected_size,
                width,
                height,
                frame.len()
            )));
        }

        trace!(frame = self.frame_count, pts = pts_100ns, "Encoding frame");

        let y_size = (width * height) as usize;
        let chroma_size = y_size / 4;
        let (y_plane, chroma) = frame.split_at(y_size);
        let (u_plane, v_plane) = chroma.split_at(chroma_size);

        let image = x264::Image::new(
            x264::Colorspace::I420,
            width as i32,
            height as i32,
            &[
                x264::Plane {
                    data: y_plane,
                    stride: width as i32,
                },
                x264::Plane {
                    data: u_plane,
                    stride: (width / 2) as i32,
                },
                x264::Plane {
                    data: v_plane,
                    stride: (width / 2) as i32,
                },
            ],
        );

        // Encoder timebase is 1/fps.
        let pts = (pts_100ns * self.config.fps as u64) / 10_000_000;

        let (data, picture) = self
            .encoder
            .encode(pts as i64, image)
            .map_err(|e| EncoderError::Encoding(format!("x264 encode failed: {:?}", e)))?;

        self.frame_count += 1;

        if data.len() == 0 {
            return Ok(None);
        }

        Ok(Some(EncodedVideoPacket {
            data: Bytes::from(data.entirety().to_vec()),
            pts_100ns,
            is_keyframe: picture.keyframe(),
        }))
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn name(&self) -> &'static str {
        "x264"
    }
}

// SAFETY: x264::Encoder holds raw pointers but is only driven from the one
// pump task that owns this value.
unsafe impl Send for X264Encoder {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i420::rgba_to_i420;

    #[test]
    fn test_first_frame_is_emitted_immediately_as_keyframe() {
        let config = VideoEncoderConfig {
            width: 16,
            height: 16,
            ..Default::default()
        };
        let mut encoder = X264Encoder::new(config).unwrap();
        let rgba = vec![128u8; 16 * 16 * 4];
        let yuv = rgba_to_i420(&rgba, 16, 16).unwrap();

        let packet = encoder.encode(&yuv, 0).unwrap().unwrap();
        assert!(packet.is_keyframe);
        assert!(!packet.data.is_empty());

        let next = encoder.encode(&yuv, 166_667).unwrap();
        assert!(next.is_some());
    }

    #[test]
    fn test_wrong_frame_size_is_rejected() {
        let mut encoder = X264Encoder::new(VideoEncoderConfig::default()).unwrap();
        let err = encoder.encode(&[0u8; 10], 0).unwrap_err();
        assert!(matches!(err, EncoderError::InvalidInput(_)));
    }
}
