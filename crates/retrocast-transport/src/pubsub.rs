//! Pub/sub payload encoding.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use retrocast_core::{AudioChunk, Frame};
use retrocast_encoder::encode_png;
use retrocast_ipc::StreamEvent;

use crate::TransportResult;

/// Encode a frame as a PNG `frame` event.
pub fn frame_event(frame: &Frame) -> TransportResult<StreamEvent> {
    let png = encode_png(&frame.data, frame.width, frame.height)?;
    Ok(StreamEvent::Frame {
        width: frame.width,
        height: frame.height,
        data: STANDARD.encode(png),
        format: "png".to_string(),
        timestamp: frame.timestamp.unix_ms,
    })
}

/// Encode an audio chunk as an `audio` event carrying s16le PCM.
pub fn audio_event(chunk: &AudioChunk) -> StreamEvent {
    StreamEvent::Audio {
        sample_rate: chunk.sample_rate,
        channels: chunk.channels,
        data: STANDARD.encode(chunk.to_le_bytes()),
        format: "s16le".to_string(),
        timestamp: chunk.timestamp.unix_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use retrocast_core::CaptureTimestamp;
    use std::time::Instant;

    #[test]
    fn test_frame_event_shape() {
        let frame = Frame::new(
            Bytes::from(vec![255u8; 2 * 2 * 4]),
            2,
            2,
            CaptureTimestamp::now(Instant::now()),
            0,
        );
        let event = frame_event(&frame).unwrap();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "frame");
        assert_eq!(json["format"], "png");
        assert_eq!(json["width"], 2);

        let png = STANDARD.decode(json["data"].as_str().unwrap()).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }

    #[test]
    fn test_audio_event_shape() {
        let chunk = AudioChunk::stereo(vec![1, -2], 32_040, CaptureTimestamp::now(Instant::now()));
        let json = serde_json::to_value(audio_event(&chunk)).unwrap();
        assert_eq!(json["type"], "audio");
        assert_eq!(json["sampleRate"], 32_040);
        assert_eq!(json["channels"], 2);
        assert_eq!(
            STANDARD.decode(json["data"].as_str().unwrap()).unwrap(),
            vec![0x01, 0x00, 0xfe, 0xff]
        );
    }
}
