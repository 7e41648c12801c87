//! WebRTC peer sessions.
//!
//! Each peer session owns one peer connection with an H.264 video track, an
//! Opus audio track and an unreliable `input` data channel. Signaling is
//! driven by the viewer: we offer, the viewer answers, and candidates trickle
//! both ways. Local candidates and state changes are pushed to the viewer's
//! outbox; remote candidates that arrive before the answer are buffered.

mod candidates;
mod pump;
mod rtc;
mod state;

pub use candidates::CandidateBuffer;
pub use state::transition;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use retrocast_ipc::{
    EngineConfig, EngineEvent, IceCandidate, InputEvent, PeerSessionId, PeerState,
    SessionDescription, SessionId, SignalingEvent, ViewerId, ViewerMessage,
};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};
use webrtc::api::API;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::broadcast::{Broadcaster, MediaSink, SinkKind};
use crate::{TransportError, TransportResult, INPUT_CHANNEL_LABEL};

/// Settings for the peer transport.
#[derive(Debug, Clone)]
pub struct PeerTransportConfig {
    /// STUN/TURN urls. Empty means host candidates only.
    pub ice_servers: Vec<String>,

    /// How long a disconnected peer is kept before it is closed.
    pub disconnect_grace: Duration,

    /// Sample rate of the outbound audio track.
    pub audio_sample_rate: u32,
}

impl PeerTransportConfig {
    /// Derive from the engine configuration.
    pub fn from_engine_config(config: &EngineConfig) -> Self {
        Self {
            ice_servers: config.ice_servers.clone(),
            disconnect_grace: config.ice_disconnect_grace(),
            audio_sample_rate: config.peer_audio_sample_rate,
        }
    }
}

impl Default for PeerTransportConfig {
    fn default() -> Self {
        Self::from_engine_config(&EngineConfig::default())
    }
}

/// A viewer input event received over a data channel.
#[derive(Debug, Clone)]
pub struct PeerInput {
    /// Game session the peer is bound to.
    pub game_session_id: SessionId,

    /// The event.
    pub event: InputEvent,
}

/// One peer session.
pub(crate) struct PeerSession {
    pub(crate) id: PeerSessionId,
    game_session_id: SessionId,
    viewer_id: ViewerId,
    pc: Arc<RTCPeerConnection>,
    pub(crate) video_track: Arc<TrackLocalStaticSample>,
    pub(crate) audio_track: Arc<TrackLocalStaticSample>,
    data_channel: Arc<RTCDataChannel>,
    pub(crate) sink: Arc<MediaSink>,
    state: Mutex<PeerState>,
    /// Serializes answer and candidate handling.
    negotiation: tokio::sync::Mutex<CandidateBuffer>,
    outbox: mpsc::UnboundedSender<SignalingEvent>,
    pump: Mutex<Option<JoinHandle<()>>>,
    disconnect_epoch: AtomicU64,
}

impl PeerSession {
    pub(crate) fn state(&self) -> PeerState {
        *self.state.lock()
    }
}

struct Inner {
    config: PeerTransportConfig,
    api: API,
    broadcaster: Arc<Broadcaster>,
    peers: RwLock<HashMap<PeerSessionId, Arc<PeerSession>>>,
    input_tx: mpsc::Sender<PeerInput>,
    events: broadcast::Sender<EngineEvent>,
}

/// Registry and lifecycle manager for peer sessions.
#[derive(Clone)]
pub struct PeerTransport {
    inner: Arc<Inner>,
}

impl PeerTransport {
    /// Create a peer transport.
    ///
    /// Input received on data channels is sent on `input_tx`; peer state
    /// changes are announced on `events`.
    pub fn new(
        config: PeerTransportConfig,
        broadcaster: Arc<Broadcaster>,
        input_tx: mpsc::Sender<PeerInput>,
        events: broadcast::Sender<EngineEvent>,
    ) -> TransportResult<Self> {
        let api = rtc::build_api()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                api,
                broadcaster,
                peers: RwLock::new(HashMap::new()),
                input_tx,
                events,
            }),
        })
    }

    fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    fn weak(&self) -> Weak<Inner> {
        Arc::downgrade(&self.inner)
    }

    fn session(&self, peer_id: &PeerSessionId) -> TransportResult<Arc<PeerSession>> {
        self.inner
            .peers
            .read()
            .get(peer_id)
            .cloned()
            .ok_or_else(|| TransportError::PeerNotFound(peer_id.to_string()))
    }

    /// Check that `peer_id` was created over `viewer_id`'s signaling connection.
    ///
    /// A peer owned by another viewer is reported as not found.
    pub fn ensure_owner(
        &self,
        peer_id: &PeerSessionId,
        viewer_id: &ViewerId,
    ) -> TransportResult<()> {
        match self.session(peer_id) {
            Ok(session) if &session.viewer_id == viewer_id => Ok(()),
            _ => Err(TransportError::PeerNotFound(peer_id.to_string())),
        }
    }

    /// Current state of a peer session, if it exists.
    pub fn state(&self, peer_id: &PeerSessionId) -> Option<PeerState> {
        self.inner.peers.read().get(peer_id).map(|s| s.state())
    }

    /// Number of live peer sessions.
    pub fn peer_count(&self) -> usize {
        self.inner.peers.read().len()
    }

    /// Peer sessions bound to a game session.
    pub fn peers_for_game(&self, game_session_id: &SessionId) -> Vec<PeerSessionId> {
        self.inner
            .peers
            .read()
            .values()
            .filter(|s| &s.game_session_id == game_session_id)
            .map(|s| s.id.clone())
            .collect()
    }

    /// Open a peer session for `viewer_id` bound to `game_session_id` and
    /// return its id together with the offer.
    #[instrument(
        name = "peer_create",
        skip(self, game_session_id, viewer_id, outbox),
        fields(game_session_id = %game_session_id)
    )]
    pub async fn create_session(
        &self,
        game_session_id: &SessionId,
        viewer_id: &ViewerId,
        outbox: mpsc::UnboundedSender<SignalingEvent>,
    ) -> TransportResult<(PeerSessionId, SessionDescription)> {
        let peer_id = PeerSessionId::generate();
        let pc = rtc::new_peer_connection(&self.inner.api, &self.inner.config.ice_servers).await?;

        let session = match self
            .build_session(&peer_id, game_session_id, viewer_id, &pc, outbox)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                if let Err(close_err) = pc.close().await {
                    debug!("Error closing half-built peer connection: {}", close_err);
                }
                return Err(TransportError::NegotiationFailed(e.to_string()));
            }
        };

        self.inner
            .peers
            .write()
            .insert(peer_id.clone(), Arc::clone(&session));
        self.install_handlers(&session);

        match self.offer(&session).await {
            Ok(offer) => {
                info!(peer_id = %peer_id, "Peer session created");
                Ok((peer_id, offer))
            }
            Err(e) => Err(self.fail(&session, e.to_string()).await),
        }
    }

    async fn build_session(
        &self,
        peer_id: &PeerSessionId,
        game_session_id: &SessionId,
        viewer_id: &ViewerId,
        pc: &Arc<RTCPeerConnection>,
        outbox: mpsc::UnboundedSender<SignalingEvent>,
    ) -> TransportResult<Arc<PeerSession>> {
        let video_track = rtc::video_track();
        let audio_track = rtc::audio_track(self.inner.config.audio_sample_rate);
        rtc::attach_track(pc, Arc::clone(&video_track)).await?;
        rtc::attach_track(pc, Arc::clone(&audio_track)).await?;

        let data_channel = pc
            .create_data_channel(
                INPUT_CHANNEL_LABEL,
                Some(RTCDataChannelInit {
                    ordered: Some(true),
                    max_retransmits: Some(0),
                    ..Default::default()
                }),
            )
            .await?;

        let sink = self
            .inner
            .broadcaster
            .register_sink(game_session_id, SinkKind::Peer);

        Ok(Arc::new(PeerSession {
            id: peer_id.clone(),
            game_session_id: game_session_id.clone(),
            viewer_id: viewer_id.clone(),
            pc: Arc::clone(pc),
            video_track,
            audio_track,
            data_channel,
            sink,
            state: Mutex::new(PeerState::Idle),
            negotiation: tokio::sync::Mutex::new(CandidateBuffer::new()),
            outbox,
            pump: Mutex::new(None),
            disconnect_epoch: AtomicU64::new(0),
        }))
    }

    fn install_handlers(&self, session: &Arc<PeerSession>) {
        // Local candidates go straight to the viewer.
        let outbox = session.outbox.clone();
        let peer_id = session.id.clone();
        session
            .pc
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let outbox = outbox.clone();
                let peer_id = peer_id.clone();
                Box::pin(async move {
                    let Some(candidate) = candidate else {
                        return;
                    };
                    match candidate.to_json() {
                        Ok(init) => {
                            let event = SignalingEvent::IceCandidate {
                                session_id: peer_id.clone(),
                                candidate: rtc::from_candidate_init(init),
                            };
                            if outbox.send(event).is_err() {
                                trace!(peer_id = %peer_id, "Viewer gone, candidate not sent");
                            }
                        }
                        Err(e) => warn!(peer_id = %peer_id, "Failed to serialize ICE candidate: {}", e),
                    }
                })
            }));

        let weak = self.weak();
        let peer_id = session.id.clone();
        session
            .pc
            .on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                let weak = weak.clone();
                let peer_id = peer_id.clone();
                Box::pin(async move {
                    debug!(peer_id = %peer_id, %state, "Peer connection state");
                    // Handled off the callback so closing cannot re-enter the connection.
                    tokio::spawn(async move {
                        if let Some(inner) = weak.upgrade() {
                            PeerTransport::from_inner(inner)
                                .on_connection_state(&peer_id, state)
                                .await;
                        }
                    });
                })
            }));

        let input_tx = self.inner.input_tx.clone();
        let game_session_id = session.game_session_id.clone();
        let peer_id = session.id.clone();
        session
            .data_channel
            .on_message(Box::new(move |msg: DataChannelMessage| {
                let input_tx = input_tx.clone();
                let game_session_id = game_session_id.clone();
                let peer_id = peer_id.clone();
                Box::pin(async move {
                    handle_data_channel_message(&peer_id, &game_session_id, &input_tx, &msg.data);
                })
            }));
    }

    async fn offer(&self, session: &Arc<PeerSession>) -> TransportResult<SessionDescription> {
        self.set_state(session, PeerState::Offering)?;

        let offer = session.pc.create_offer(None).await?;
        session.pc.set_local_description(offer.clone()).await?;

        self.set_state(session, PeerState::AwaitingAnswer)?;

        Ok(SessionDescription {
            kind: "offer".to_string(),
            sdp: offer.sdp,
        })
    }

    fn set_state(&self, session: &PeerSession, to: PeerState) -> TransportResult<()> {
        {
            let mut state = session.state.lock();
            *state = transition(*state, to)?;
        }

        trace!(peer_id = %session.id, state = to.name(), "Peer state");
        let event = SignalingEvent::PeerState {
            session_id: session.id.clone(),
            state: to,
        };
        if session.outbox.send(event).is_err() {
            trace!(peer_id = %session.id, "Viewer gone, state not sent");
        }
        let _ = self.inner.events.send(EngineEvent::PeerStateChanged {
            peer_id: session.id.clone(),
            game_session_id: session.game_session_id.clone(),
            state: to,
        });
        Ok(())
    }

    /// Apply the viewer's answer and flush buffered candidates.
    #[instrument(name = "peer_answer", skip(self, peer_id, answer), fields(peer_id = %peer_id))]
    pub async fn apply_answer(
        &self,
        peer_id: &PeerSessionId,
        answer: SessionDescription,
    ) -> TransportResult<()> {
        let session = self.session(peer_id)?;
        let mut negotiation = session.negotiation.lock().await;

        let state = session.state();
        if state != PeerState::AwaitingAnswer || negotiation.is_ready() {
            return Err(TransportError::NegotiationFailed(format!(
                "cannot apply an answer in state {}",
                state.name()
            )));
        }

        if answer.kind != "answer" {
            drop(negotiation);
            return Err(self
                .fail(&session, format!("expected an answer, got {:?}", answer.kind))
                .await);
        }

        let applied = match RTCSessionDescription::answer(answer.sdp) {
            Ok(description) => session.pc.set_remote_description(description).await,
            Err(e) => Err(e),
        };
        if let Err(e) = applied {
            drop(negotiation);
            return Err(self.fail(&session, format!("invalid answer: {}", e)).await);
        }

        let pending = negotiation.mark_ready();
        let flushed = pending.len();
        // A bad buffered candidate fails the peer exactly like a bad direct one.
        for candidate in pending {
            if let Err(e) = session
                .pc
                .add_ice_candidate(rtc::to_candidate_init(candidate))
                .await
            {
                drop(negotiation);
                return Err(self.fail(&session, format!("invalid candidate: {}", e)).await);
            }
        }

        info!(buffered_candidates = flushed, "Answer applied");
        Ok(())
    }

    /// Apply a remote candidate, buffering it if the answer has not arrived.
    pub async fn add_remote_candidate(
        &self,
        peer_id: &PeerSessionId,
        candidate: IceCandidate,
    ) -> TransportResult<()> {
        let session = self.session(peer_id)?;
        let mut negotiation = session.negotiation.lock().await;

        if candidate.candidate.trim().is_empty() {
            trace!(peer_id = %peer_id, "End of remote candidates");
            return Ok(());
        }

        let Some(candidate) = negotiation.offer(candidate) else {
            debug!(peer_id = %peer_id, buffered = negotiation.len(), "Buffered early candidate");
            return Ok(());
        };

        if let Err(e) = session
            .pc
            .add_ice_candidate(rtc::to_candidate_init(candidate))
            .await
        {
            drop(negotiation);
            return Err(self.fail(&session, format!("invalid candidate: {}", e)).await);
        }
        Ok(())
    }

    /// Close a peer session and release its connection, tracks and sink.
    #[instrument(name = "peer_close", skip(self, peer_id), fields(peer_id = %peer_id))]
    pub async fn close(&self, peer_id: &PeerSessionId) -> TransportResult<()> {
        let session = self
            .inner
            .peers
            .write()
            .remove(peer_id)
            .ok_or_else(|| TransportError::PeerNotFound(peer_id.to_string()))?;
        self.teardown(&session).await;
        Ok(())
    }

    /// Close every peer bound to a game session.
    pub async fn close_for_game(&self, game_session_id: &SessionId) -> usize {
        let ids = self.peers_for_game(game_session_id);
        self.close_all(ids).await
    }

    /// Close every peer created over one viewer's signaling connection.
    pub async fn close_for_viewer(&self, viewer_id: &ViewerId) -> usize {
        let ids: Vec<PeerSessionId> = self
            .inner
            .peers
            .read()
            .values()
            .filter(|s| &s.viewer_id == viewer_id)
            .map(|s| s.id.clone())
            .collect();
        self.close_all(ids).await
    }

    async fn close_all(&self, ids: Vec<PeerSessionId>) -> usize {
        let mut closed = 0;
        for id in ids {
            if self.close(&id).await.is_ok() {
                closed += 1;
            }
        }
        closed
    }

    async fn teardown(&self, session: &PeerSession) {
        if let Err(e) = self.set_state(session, PeerState::Closed) {
            debug!("{}", e);
        }

        let pump = session.pump.lock().take();
        if let Some(pump) = pump {
            pump.abort();
        }
        self.inner
            .broadcaster
            .unregister_sink(&session.game_session_id, session.sink.id());

        if let Err(e) = session.data_channel.close().await {
            debug!("Error closing data channel: {}", e);
        }
        if let Err(e) = session.pc.close().await {
            warn!("Error closing peer connection: {}", e);
        }

        info!(game_session_id = %session.game_session_id, "Peer session closed");
    }

    /// Close the session and turn `cause` into a negotiation error.
    async fn fail(&self, session: &PeerSession, cause: String) -> TransportError {
        warn!(peer_id = %session.id, "Negotiation failed: {}", cause);
        if let Err(e) = self.close(&session.id).await {
            debug!("{}", e);
        }
        TransportError::NegotiationFailed(cause)
    }

    async fn on_connection_state(&self, peer_id: &PeerSessionId, state: RTCPeerConnectionState) {
        let Ok(session) = self.session(peer_id) else {
            return;
        };
        let current = session.state();

        match state {
            RTCPeerConnectionState::Connected => {
                if matches!(current, PeerState::AwaitingAnswer | PeerState::Disconnected) {
                    if self.set_state(&session, PeerState::Connected).is_ok() {
                        info!(peer_id = %peer_id, "Peer connected");
                        self.start_pump(&session);
                    }
                }
            }
            RTCPeerConnectionState::Disconnected | RTCPeerConnectionState::Failed => {
                if current == PeerState::Connected {
                    if self.set_state(&session, PeerState::Disconnected).is_ok() {
                        warn!(peer_id = %peer_id, "Peer disconnected, waiting for recovery");
                        self.schedule_expiry(&session);
                    }
                } else if current == PeerState::AwaitingAnswer
                    && state == RTCPeerConnectionState::Failed
                {
                    self.fail(&session, "connectivity checks failed".to_string())
                        .await;
                }
            }
            RTCPeerConnectionState::Closed => {
                if let Err(e) = self.close(peer_id).await {
                    trace!("{}", e);
                }
            }
            _ => {}
        }
    }

    fn start_pump(&self, session: &Arc<PeerSession>) {
        let mut pump = session.pump.lock();
        if pump.is_none() {
            let task = pump::run(Arc::clone(session), self.inner.config.audio_sample_rate);
            *pump = Some(tokio::spawn(task));
        }
    }

    fn schedule_expiry(&self, session: &PeerSession) {
        let epoch = session.disconnect_epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let grace = self.inner.config.disconnect_grace;
        let weak = self.weak();
        let peer_id = session.id.clone();

        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(inner) = weak.upgrade() {
                PeerTransport::from_inner(inner)
                    .expire(&peer_id, epoch)
                    .await;
            }
        });
    }

    async fn expire(&self, peer_id: &PeerSessionId, epoch: u64) {
        let Ok(session) = self.session(peer_id) else {
            return;
        };
        if session.state() == PeerState::Disconnected
            && session.disconnect_epoch.load(Ordering::Acquire) == epoch
        {
            info!(peer_id = %peer_id, "Disconnect grace expired");
            if let Err(e) = self.close(peer_id).await {
                debug!("{}", e);
            }
        }
    }
}

/// Parse one data-channel message and forward valid input.
fn handle_data_channel_message(
    peer_id: &PeerSessionId,
    game_session_id: &SessionId,
    input_tx: &mpsc::Sender<PeerInput>,
    data: &[u8],
) {
    match serde_json::from_slice::<ViewerMessage>(data) {
        Ok(ViewerMessage::Input(payload)) => match payload.into_event() {
            Some(event) => {
                let input = PeerInput {
                    game_session_id: game_session_id.clone(),
                    event,
                };
                if let Err(e) = input_tx.try_send(input) {
                    debug!(peer_id = %peer_id, "Peer input dropped: {}", e);
                }
            }
            None => debug!(peer_id = %peer_id, "Input message without a pressed state"),
        },
        Ok(ViewerMessage::Other) => trace!(peer_id = %peer_id, "Ignoring non-input message"),
        Err(e) => warn!(peer_id = %peer_id, "Malformed data channel message: {}", e),
    }
}
