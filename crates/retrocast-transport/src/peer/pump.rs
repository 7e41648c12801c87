//! Per-peer media pump: sink -> encoders -> tracks.

use std::sync::Arc;
use std::time::Duration;

use retrocast_audio::{resample_linear, AudioResult, PacketFramer, PACKET_MS};
use retrocast_core::{AudioChunk, Frame};
use retrocast_encoder::{
    create_audio_encoder, create_video_encoder, rgba_to_i420, AudioEncoder, AudioEncoderConfig,
    EncoderError, VideoEncoder, VideoEncoderConfig,
};
use tracing::{debug, info, warn};
use webrtc::media::Sample;

use super::PeerSession;
use crate::broadcast::SinkItem;
use crate::VIDEO_SAMPLE_DURATION;

/// Encoder slot that is created lazily and disabled after a fatal error.
enum Slot<E> {
    Empty,
    Ready(E),
    Disabled,
}

/// Turns captured audio chunks into track-rate packets.
struct AudioPackets {
    rate: u32,
    framer: PacketFramer,
}

impl AudioPackets {
    fn new(rate: u32) -> Self {
        Self {
            rate,
            framer: PacketFramer::new(),
        }
    }

    /// Resample a chunk to the track rate and return every complete packet.
    fn push(&mut self, chunk: &AudioChunk) -> AudioResult<Vec<Vec<i16>>> {
        let resampled =
            resample_linear(&chunk.samples, chunk.sample_rate, self.rate, chunk.channels)?;
        Ok(self.framer.push(&resampled))
    }
}

struct Pump {
    session: Arc<PeerSession>,
    audio_rate: u32,
    video: Slot<Box<dyn VideoEncoder>>,
    audio: Slot<Box<dyn AudioEncoder>>,
    packets: AudioPackets,
    frames_sent: u64,
    packets_sent: u64,
}

/// Run until the peer's sink closes.
pub(crate) async fn run(session: Arc<PeerSession>, audio_rate: u32) {
    let mut pump = Pump {
        session,
        audio_rate,
        video: Slot::Empty,
        audio: Slot::Empty,
        packets: AudioPackets::new(audio_rate),
        frames_sent: 0,
        packets_sent: 0,
    };

    debug!(peer_id = %pump.session.id, "Media pump started");

    while let Some(item) = pump.session.sink.recv().await {
        // Media only flows while connected; anything else is stale.
        if !pump.session.state().is_connected() {
            continue;
        }
        match item {
            SinkItem::Frame(frame) => pump.video(frame).await,
            SinkItem::Audio(chunk) => pump.audio(chunk).await,
        }
    }

    debug!(
        peer_id = %pump.session.id,
        frames = pump.frames_sent,
        audio_packets = pump.packets_sent,
        "Media pump finished"
    );
}

fn disabled_reason(kind: &str, peer_id: &str, err: &EncoderError) {
    match err {
        EncoderError::NotSupported(_) => {
            info!(peer_id, "{} track disabled: {}", kind, err)
        }
        _ => warn!(peer_id, "{} encoder unavailable: {}", kind, err),
    }
}

impl Pump {
    async fn video(&mut self, frame: Frame) {
        let yuv = match rgba_to_i420(&frame.data, frame.width, frame.height) {
            Ok(yuv) => yuv,
            Err(e) => {
                debug!(peer_id = %self.session.id, "Skipping frame: {}", e);
                return;
            }
        };

        if matches!(self.video, Slot::Disabled) {
            return;
        }

        let needs_encoder = match &self.video {
            Slot::Ready(encoder) => encoder.dimensions() != (frame.width, frame.height),
            _ => true,
        };
        if needs_encoder {
            let config = VideoEncoderConfig {
                width: frame.width,
                height: frame.height,
                ..Default::default()
            };
            match create_video_encoder(config) {
                Ok(encoder) => {
                    debug!(
                        peer_id = %self.session.id,
                        width = frame.width,
                        height = frame.height,
                        encoder = encoder.name(),
                        "Video encoder ready"
                    );
                    self.video = Slot::Ready(encoder);
                }
                Err(e) => {
                    disabled_reason("Video", self.session.id.as_str(), &e);
                    self.video = Slot::Disabled;
                    return;
                }
            }
        }

        let Slot::Ready(encoder) = &mut self.video else {
            return;
        };

        let packet = match encoder.encode(&yuv, frame.timestamp.pts_100ns) {
            Ok(Some(packet)) => packet,
            Ok(None) => return,
            Err(e) => {
                warn!(peer_id = %self.session.id, "Video encode failed: {}", e);
                return;
            }
        };

        let sample = Sample {
            data: packet.data,
            duration: VIDEO_SAMPLE_DURATION,
            ..Default::default()
        };
        if let Err(e) = self.session.video_track.write_sample(&sample).await {
            debug!(peer_id = %self.session.id, "Video sample dropped: {}", e);
            return;
        }
        self.frames_sent += 1;
    }

    async fn audio(&mut self, chunk: AudioChunk) {
        if chunk.samples.is_empty() {
            return;
        }

        let packets = match self.packets.push(&chunk) {
            Ok(packets) => packets,
            Err(e) => {
                debug!(peer_id = %self.session.id, "Skipping audio chunk: {}", e);
                return;
            }
        };

        if matches!(self.audio, Slot::Disabled) {
            return;
        }

        if matches!(self.audio, Slot::Empty) {
            let config = AudioEncoderConfig {
                sample_rate: self.audio_rate,
                channels: chunk.channels,
                ..Default::default()
            };
            match create_audio_encoder(config) {
                Ok(encoder) => self.audio = Slot::Ready(encoder),
                Err(e) => {
                    disabled_reason("Audio", self.session.id.as_str(), &e);
                    self.audio = Slot::Disabled;
                    return;
                }
            }
        }

        let Slot::Ready(encoder) = &mut self.audio else {
            return;
        };

        for packet in packets {
            let encoded = match encoder.encode(&packet) {
                Ok(encoded) => encoded,
                Err(e) => {
                    warn!(peer_id = %self.session.id, "Audio encode failed: {}", e);
                    continue;
                }
            };

            let sample = Sample {
                data: encoded.data,
                duration: Duration::from_millis(u64::from(PACKET_MS)),
                ..Default::default()
            };
            if let Err(e) = self.session.audio_track.write_sample(&sample).await {
                debug!(peer_id = %self.session.id, "Audio sample dropped: {}", e);
                continue;
            }
            self.packets_sent += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrocast_audio::AudioError;
    use retrocast_core::CaptureTimestamp;
    use std::time::Instant;

    fn chunk(frames: usize, sample_rate: u32) -> AudioChunk {
        AudioChunk::stereo(
            vec![100i16; frames * 2],
            sample_rate,
            CaptureTimestamp::now(Instant::now()),
        )
    }

    #[test]
    fn test_audio_packets_carry_partial_packets_over() {
        let mut packets = AudioPackets::new(48_000);

        let first = packets.push(&chunk(1000, 48_000)).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].len(), 1920);

        let second = packets.push(&chunk(1000, 48_000)).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(packets.framer.pending(), 4000 - 2 * 1920);
    }

    #[test]
    fn test_audio_packets_resample_to_track_rate() {
        let mut packets = AudioPackets::new(48_000);
        let out = packets.push(&chunk(480, 24_000)).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].iter().all(|&s| s == 100));
        assert_eq!(packets.framer.pending(), 0);
    }

    #[test]
    fn test_audio_packets_reject_bad_rate() {
        let mut packets = AudioPackets::new(48_000);
        assert!(matches!(
            packets.push(&chunk(10, 0)),
            Err(AudioError::InvalidSampleRate(0))
        ));
    }
}
