//! Re-cutting variable-sized chunks into fixed-size packets.

use tracing::trace;

use crate::{CHANNELS, SAMPLES_PER_PACKET};

/// Accumulates interleaved samples and emits fixed-size packets.
///
/// Capture ticks produce roughly 800 frames of 48 kHz audio each, while the
/// peer audio encoder wants exactly 960-frame packets.
#[derive(Debug)]
pub struct PacketFramer {
    pending: Vec<i16>,
    packet_len: usize,
}

impl PacketFramer {
    /// Framer for 20 ms stereo packets at 48 kHz.
    pub fn new() -> Self {
        Self::with_packet_len(SAMPLES_PER_PACKET * CHANNELS as usize)
    }

    /// Framer with an explicit packet length in interleaved samples.
    pub fn with_packet_len(packet_len: usize) -> Self {
        Self {
            pending: Vec::with_capacity(packet_len * 2),
            packet_len: packet_len.max(1),
        }
    }

    /// Interleaved samples per emitted packet.
    pub fn packet_len(&self) -> usize {
        self.packet_len
    }

    /// Samples waiting for a complete packet.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Append samples and drain every complete packet.
    pub fn push(&mut self, samples: &[i16]) -> Vec<Vec<i16>> {
        self.pending.extend_from_slice(samples);

        let complete = self.pending.len() / self.packet_len;
        let mut packets = Vec::with_capacity(complete);
        for _ in 0..complete {
            let rest = self.pending.split_off(self.packet_len);
            packets.push(std::mem::replace(&mut self.pending, rest));
        }

        if complete > 0 {
            trace!(packets = complete, pending = self.pending.len(), "Framed audio");
        }
        packets
    }

    /// Drop any partial packet.
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

impl Default for PacketFramer {
    fn default() -> Self {
        Self::new()
    }
}
