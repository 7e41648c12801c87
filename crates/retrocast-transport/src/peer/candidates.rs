//! Remote candidates received before the answer.

use retrocast_ipc::IceCandidate;

/// Holds remote candidates until a remote description exists.
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    pending: Vec<IceCandidate>,
    remote_description_set: bool,
}

impl CandidateBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the answer has been applied.
    pub fn is_ready(&self) -> bool {
        self.remote_description_set
    }

    /// Buffer a candidate. Returns it back if the answer is already applied,
    /// so the caller applies it directly.
    pub fn offer(&mut self, candidate: IceCandidate) -> Option<IceCandidate> {
        if self.remote_description_set {
            Some(candidate)
        } else {
            self.pending.push(candidate);
            None
        }
    }

    /// Mark the answer applied and drain buffered candidates in arrival order.
    pub fn mark_ready(&mut self) -> Vec<IceCandidate> {
        self.remote_description_set = true;
        std::mem::take(&mut self.pending)
    }

    /// Number of buffered candidates.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(n: u16) -> IceCandidate {
        IceCandidate {
            candidate: format!("candidate:{n} 1 udp 1 127.0.0.1 {} typ host", 5000 + n),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }
    }

    #[test]
    fn test_buffers_until_ready() {
        let mut buffer = CandidateBuffer::new();
        assert!(buffer.offer(candidate(1)).is_none());
        assert!(buffer.offer(candidate(2)).is_none());
        assert_eq!(buffer.len(), 2);

        let flushed = buffer.mark_ready();
        assert_eq!(flushed, vec![candidate(1), candidate(2)]);
        assert!(buffer.is_empty());
        assert!(buffer.is_ready());

        assert_eq!(buffer.offer(candidate(3)), Some(candidate(3)));
        assert!(buffer.is_empty());
    }
}
