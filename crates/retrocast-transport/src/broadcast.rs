//! Per-session sink registry and stream-mode filtered fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use retrocast_core::{AudioChunk, Frame};
use retrocast_ipc::{SessionId, StreamMode};
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::mailbox::Mailbox;

/// Identifier of one registered sink.
pub type SinkId = u64;

/// Which side of the broadcast layer consumes a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkKind {
    /// WebSocket subscriber receiving PNG stills.
    PubSub,

    /// WebRTC peer receiving raw media for its track encoders.
    Peer,
}

impl SinkKind {
    /// Check whether this kind receives media under `mode`.
    pub fn accepts(self, mode: StreamMode) -> bool {
        match self {
            Self::PubSub => mode.includes_pubsub(),
            Self::Peer => mode.includes_peer(),
        }
    }
}

/// An item taken from a sink.
#[derive(Debug, Clone)]
pub enum SinkItem {
    Frame(Frame),
    Audio(AudioChunk),
}

/// A consumer endpoint: one frame mailbox and one audio mailbox.
#[derive(Debug)]
pub struct MediaSink {
    id: SinkId,
    kind: SinkKind,
    session_id: SessionId,
    frames: Mailbox<Frame>,
    audio: Mailbox<AudioChunk>,
    notify: Arc<Notify>,
    closed: AtomicBool,
}

impl MediaSink {
    fn new(id: SinkId, kind: SinkKind, session_id: SessionId) -> Self {
        let notify = Arc::new(Notify::new());
        Self {
            id,
            kind,
            session_id,
            frames: Mailbox::with_notify(Arc::clone(&notify)),
            audio: Mailbox::with_notify(Arc::clone(&notify)),
            notify,
            closed: AtomicBool::new(false),
        }
    }

    /// Sink id.
    pub fn id(&self) -> SinkId {
        self.id
    }

    /// Sink kind.
    pub fn kind(&self) -> SinkKind {
        self.kind
    }

    /// Session this sink is attached to.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Wait for the next frame or audio chunk.
    ///
    /// Audio is handed out before a pending frame. Returns `None` once the
    /// sink is closed.
    pub async fn recv(&self) -> Option<SinkItem> {
        loop {
            let notified = self.notify.notified();
            if self.is_closed() {
                return None;
            }
            if let Some(chunk) = self.audio.take() {
                return Some(SinkItem::Audio(chunk));
            }
            if let Some(frame) = self.frames.take() {
                return Some(SinkItem::Frame(frame));
            }
            notified.await;
        }
    }

    /// Take the pending frame without waiting.
    pub fn take_frame(&self) -> Option<Frame> {
        self.frames.take()
    }

    /// Take the pending audio chunk without waiting.
    pub fn take_audio(&self) -> Option<AudioChunk> {
        self.audio.take()
    }

    /// Items overwritten before the consumer took them.
    pub fn dropped(&self) -> u64 {
        self.frames.dropped() + self.audio.dropped()
    }

    /// Close the sink. The broadcaster prunes it on its next publish.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.frames.close();
        self.audio.close();
        self.notify.notify_one();
    }

    /// Check if closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Outcome of one publish call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishStats {
    /// Sinks the item was placed in.
    pub delivered: usize,

    /// Sinks where an unconsumed item was overwritten.
    pub dropped: usize,
}

/// Fan-out of captured media to the sinks registered per session.
#[derive(Debug, Default)]
pub struct Broadcaster {
    sinks: RwLock<HashMap<SessionId, Vec<Arc<MediaSink>>>>,
    next_id: AtomicU64,
}

impl Broadcaster {
    /// Create an empty broadcaster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new sink to `session_id`.
    pub fn register_sink(&self, session_id: &SessionId, kind: SinkKind) -> Arc<MediaSink> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let sink = Arc::new(MediaSink::new(id, kind, session_id.clone()));
        self.sinks
            .write()
            .entry(session_id.clone())
            .or_default()
            .push(Arc::clone(&sink));
        debug!(session_id = %session_id, sink_id = id, ?kind, "Sink registered");
        sink
    }

    /// Detach and close a sink.
    pub fn unregister_sink(&self, session_id: &SessionId, sink_id: SinkId) {
        let mut sinks = self.sinks.write();
        if let Some(list) = sinks.get_mut(session_id) {
            list.retain(|sink| {
                if sink.id() == sink_id {
                    sink.close();
                    false
                } else {
                    true
                }
            });
            if list.is_empty() {
                sinks.remove(session_id);
            }
        }
        debug!(session_id = %session_id, sink_id, "Sink unregistered");
    }

    /// Close and drop every sink of a session.
    pub fn remove_session(&self, session_id: &SessionId) {
        if let Some(list) = self.sinks.write().remove(session_id) {
            for sink in &list {
                sink.close();
            }
            debug!(session_id = %session_id, count = list.len(), "Session sinks closed");
        }
    }

    /// Number of open sinks for a session.
    pub fn sink_count(&self, session_id: &SessionId) -> usize {
        self.sinks
            .read()
            .get(session_id)
            .map(|list| list.iter().filter(|s| !s.is_closed()).count())
            .unwrap_or(0)
    }

    /// Publish a frame to the sinks admitted by `mode`.
    pub fn publish_frame(&self, session_id: &SessionId, mode: StreamMode, frame: Frame) -> PublishStats {
        self.publish(session_id, mode, |sink| sink.frames.put(frame.clone()))
    }

    /// Publish an audio chunk to the sinks admitted by `mode`.
    pub fn publish_audio(
        &self,
        session_id: &SessionId,
        mode: StreamMode,
        chunk: AudioChunk,
    ) -> PublishStats {
        self.publish(session_id, mode, |sink| sink.audio.put(chunk.clone()))
    }

    fn publish<F>(&self, session_id: &SessionId, mode: StreamMode, put: F) -> PublishStats
    where
        F: Fn(&MediaSink) -> bool,
    {
        let snapshot = match self.sinks.read().get(session_id) {
            Some(list) => list.clone(),
            None => return PublishStats::default(),
        };

        let mut stats = PublishStats::default();
        let mut saw_closed = false;
        for sink in &snapshot {
            if sink.is_closed() {
                saw_closed = true;
                continue;
            }
            if !sink.kind().accepts(mode) {
                continue;
            }
            if put(sink) {
                stats.dropped += 1;
            }
            stats.delivered += 1;
        }

        if saw_closed {
            self.prune(session_id);
        }

        trace!(
            session_id = %session_id,
            delivered = stats.delivered,
            dropped = stats.dropped,
            "Published"
        );
        stats
    }

    fn prune(&self, session_id: &SessionId) {
        let mut sinks = self.sinks.write();
        if let Some(list) = sinks.get_mut(session_id) {
            list.retain(|sink| !sink.is_closed());
            if list.is_empty() {
                sinks.remove(session_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use retrocast_core::CaptureTimestamp;
    use std::time::{Duration, Instant};

    fn frame(sequence: u64) -> Frame {
        Frame::new(
            Bytes::from(vec![0u8; 2 * 2 * 4]),
            2,
            2,
            CaptureTimestamp::now(Instant::now()),
            sequence,
        )
    }

    fn chunk() -> AudioChunk {
        AudioChunk::stereo(vec![0; 4], 32_040, CaptureTimestamp::now(Instant::now()))
    }

    #[test]
    fn test_pubsub_mode_skips_peer_sinks() {
        let broadcaster = Broadcaster::new();
        let id = SessionId::from("s1");
        let pubsub = broadcaster.register_sink(&id, SinkKind::PubSub);
        let peer = broadcaster.register_sink(&id, SinkKind::Peer);

        let stats = broadcaster.publish_frame(&id, StreamMode::PubSub, frame(1));
        assert_eq!(stats.delivered, 1);
        assert!(pubsub.take_frame().is_some());
        assert!(peer.take_frame().is_none());
    }

    #[test]
    fn test_both_mode_reaches_every_sink() {
        let broadcaster = Broadcaster::new();
        let id = SessionId::from("s1");
        let pubsub = broadcaster.register_sink(&id, SinkKind::PubSub);
        let peer = broadcaster.register_sink(&id, SinkKind::Peer);

        broadcaster.publish_audio(&id, StreamMode::Both, chunk());
        assert!(pubsub.take_audio().is_some());
        assert!(peer.take_audio().is_some());
    }

    #[test]
    fn test_peer_mode_skips_pubsub_sinks() {
        let broadcaster = Broadcaster::new();
        let id = SessionId::from("s1");
        let pubsub = broadcaster.register_sink(&id, SinkKind::PubSub);
        let peer = broadcaster.register_sink(&id, SinkKind::Peer);

        broadcaster.publish_frame(&id, StreamMode::Peer, frame(1));
        assert!(pubsub.take_frame().is_none());
        assert!(peer.take_frame().is_some());
    }

    #[test]
    fn test_slow_sink_sees_latest_frame() {
        let broadcaster = Broadcaster::new();
        let id = SessionId::from("s1");
        let sink = broadcaster.register_sink(&id, SinkKind::PubSub);

        broadcaster.publish_frame(&id, StreamMode::PubSub, frame(1));
        broadcaster.publish_frame(&id, StreamMode::PubSub, frame(2));
        let stats = broadcaster.publish_frame(&id, StreamMode::PubSub, frame(3));

        assert_eq!(stats.dropped, 1);
        assert_eq!(sink.take_frame().unwrap().sequence, 3);
        assert_eq!(sink.dropped(), 2);
    }

    #[test]
    fn test_closed_sink_is_pruned() {
        let broadcaster = Broadcaster::new();
        let id = SessionId::from("s1");
        let a = broadcaster.register_sink(&id, SinkKind::PubSub);
        let _b = broadcaster.register_sink(&id, SinkKind::PubSub);
        assert_eq!(broadcaster.sink_count(&id), 2);

        a.close();
        let stats = broadcaster.publish_frame(&id, StreamMode::PubSub, frame(1));
        assert_eq!(stats.delivered, 1);
        assert_eq!(broadcaster.sinks.read().get(&id).map(Vec::len), Some(1));
    }

    #[test]
    fn test_unregister_and_remove_session() {
        let broadcaster = Broadcaster::new();
        let id = SessionId::from("s1");
        let a = broadcaster.register_sink(&id, SinkKind::PubSub);
        let b = broadcaster.register_sink(&id, SinkKind::Peer);

        broadcaster.unregister_sink(&id, a.id());
        assert!(a.is_closed());
        assert_eq!(broadcaster.sink_count(&id), 1);

        broadcaster.remove_session(&id);
        assert!(b.is_closed());
        assert_eq!(broadcaster.sink_count(&id), 0);
    }

    #[tokio::test]
    async fn test_recv_prefers_audio_then_frame() {
        let broadcaster = Broadcaster::new();
        let id = SessionId::from("s1");
        let sink = broadcaster.register_sink(&id, SinkKind::Peer);

        broadcaster.publish_frame(&id, StreamMode::Peer, frame(1));
        broadcaster.publish_audio(&id, StreamMode::Peer, chunk());

        let first = tokio::time::timeout(Duration::from_secs(1), sink.recv()).await.unwrap();
        assert!(matches!(first, Some(SinkItem::Audio(_))));
        let second = tokio::time::timeout(Duration::from_secs(1), sink.recv()).await.unwrap();
        assert!(matches!(second, Some(SinkItem::Frame(_))));

        sink.close();
        assert!(sink.recv().await.is_none());
    }
}
