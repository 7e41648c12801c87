//! Frame and audio types produced by a capture tick.

use bytes::Bytes;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::{CoreError, CoreResult, EmulatorCore, AUDIO_CHANNELS, BYTES_PER_PIXEL};

/// Timestamp for a captured frame.
#[derive(Debug, Clone, Copy)]
pub struct CaptureTimestamp {
    /// Monotonic timestamp when the frame was captured.
    pub capture_time: Instant,

    /// Presentation timestamp in 100ns units, relative to session start.
    pub pts_100ns: u64,

    /// Wall-clock time in milliseconds since the Unix epoch.
    pub unix_ms: u64,
}

impl CaptureTimestamp {
    /// Create a new capture timestamp.
    pub fn now(start_time: Instant) -> Self {
        let capture_time = Instant::now();
        let elapsed = capture_time.duration_since(start_time);
        let pts_100ns = elapsed.as_nanos() as u64 / 100;
        let unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        Self {
            capture_time,
            pts_100ns,
            unix_ms,
        }
    }

    /// Get the presentation timestamp in milliseconds.
    pub fn pts_ms(&self) -> u64 {
        self.pts_100ns / 10_000
    }
}

/// A video frame in RGBA, 8 bits per channel.
#[derive(Debug, Clone)]
pub struct Frame {
    /// RGBA pixel data, row-major, no padding.
    pub data: Bytes,

    /// Frame width in pixels.
    pub width: u32,

    /// Frame height in pixels.
    pub height: u32,

    /// Capture timestamp.
    pub timestamp: CaptureTimestamp,

    /// Monotonically increasing sequence number.
    pub sequence: u64,
}

impl Frame {
    /// Create a new frame.
    pub fn new(
        data: Bytes,
        width: u32,
        height: u32,
        timestamp: CaptureTimestamp,
        sequence: u64,
    ) -> Self {
        Self {
            data,
            width,
            height,
            timestamp,
            sequence,
        }
    }

    /// Expected RGBA buffer size for the given dimensions.
    pub fn rgba_buffer_size(width: u32, height: u32) -> usize {
        width as usize * height as usize * BYTES_PER_PIXEL
    }

    /// Validate that the frame data matches its dimensions.
    pub fn is_valid(&self) -> bool {
        self.data.len() == Self::rgba_buffer_size(self.width, self.height)
    }

    /// Read the current frame out of a core.
    ///
    /// Returns `Ok(None)` when the core has not rendered anything yet and an
    /// error when the buffer disagrees with the reported dimensions.
    pub fn from_core(
        core: &dyn EmulatorCore,
        start_time: Instant,
        sequence: u64,
    ) -> CoreResult<Option<Self>> {
        let Some(data) = core.frame_buffer() else {
            return Ok(None);
        };

        let frame = Self::new(
            data,
            core.frame_width(),
            core.frame_height(),
            CaptureTimestamp::now(start_time),
            sequence,
        );

        if !frame.is_valid() {
            return Err(CoreError::InvalidFrame {
                expected: Self::rgba_buffer_size(frame.width, frame.height),
                actual: frame.data.len(),
            });
        }

        Ok(Some(frame))
    }
}

/// A chunk of interleaved PCM audio.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved signed 16-bit samples.
    pub samples: Vec<i16>,

    /// Sample rate in Hz.
    pub sample_rate: u32,

    /// Number of interleaved channels.
    pub channels: u16,

    /// Capture timestamp.
    pub timestamp: CaptureTimestamp,
}

impl AudioChunk {
    /// Create a stereo chunk.
    pub fn stereo(samples: Vec<i16>, sample_rate: u32, timestamp: CaptureTimestamp) -> Self {
        Self {
            samples,
            sample_rate,
            channels: AUDIO_CHANNELS,
            timestamp,
        }
    }

    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Duration of the chunk in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// Samples as little-endian bytes.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StubCore;

    #[test]
    fn test_frame_from_stub_core() {
        let core = StubCore::new();
        let frame = Frame::from_core(&core, Instant::now(), 7).unwrap().unwrap();
        assert_eq!(frame.width, 240);
        assert_eq!(frame.height, 160);
        assert_eq!(frame.sequence, 7);
        assert!(frame.is_valid());
    }

    #[test]
    fn test_invalid_frame_size_detected() {
        let frame = Frame::new(
            Bytes::from_static(&[0u8; 12]),
            2,
            2,
            CaptureTimestamp::now(Instant::now()),
            0,
        );
        assert!(!frame.is_valid());
    }

    #[test]
    fn test_audio_chunk_duration() {
        let chunk = AudioChunk::stereo(vec![0; 96_000], 48_000, CaptureTimestamp::now(Instant::now()));
        assert_eq!(chunk.frames(), 48_000);
        assert!((chunk.duration_secs() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_audio_chunk_le_bytes() {
        let chunk = AudioChunk::stereo(vec![1, -1], 48_000, CaptureTimestamp::now(Instant::now()));
        assert_eq!(chunk.to_le_bytes(), vec![0x01, 0x00, 0xff, 0xff]);
    }
}
