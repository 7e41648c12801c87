//! Session registry and engine facade.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace};

use retrocast_core::{create_core, EmulatorCore};
use retrocast_ipc::{
    input_channel, EngineConfig, EngineEvent, InputEvent, PeerSessionId, SessionDescription,
    SessionId, SessionSnapshot, SessionState, SignalingEvent, StartupPhase, StopReason,
    StreamMode, ViewerId, EVENT_CHANNEL_CAPACITY,
};
use retrocast_transport::{
    Broadcaster, MediaSink, PeerInput, PeerTransport, PeerTransportConfig, SinkKind,
    PEER_INPUT_CHANNEL_CAPACITY,
};

use crate::capture::{CaptureHandle, CaptureLoop};
use crate::input::{InputRouter, RouteOutcome};
use crate::state::{CoreStartup, SessionEntry};
use crate::{EngineError, EngineResult};

/// Builds an emulation core for a module path.
pub type CoreFactory = Arc<dyn Fn(&Path) -> Box<dyn EmulatorCore> + Send + Sync>;

struct EngineInner {
    config: EngineConfig,
    core_factory: CoreFactory,
    sessions: RwLock<HashMap<SessionId, Arc<SessionEntry>>>,
    next_order: AtomicU64,
    broadcaster: Arc<Broadcaster>,
    peers: PeerTransport,
    router: InputRouter,
    events: broadcast::Sender<EngineEvent>,
    peer_input_rx: Mutex<Option<mpsc::Receiver<PeerInput>>>,
}

/// The streaming engine.
///
/// Cheap to clone; every clone addresses the same registry.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Create an engine that builds cores with [`create_core`].
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        Self::with_core_factory(config, Arc::new(|path: &Path| create_core(path)))
    }

    /// Create an engine with a custom core factory.
    pub fn with_core_factory(config: EngineConfig, core_factory: CoreFactory) -> EngineResult<Self> {
        let broadcaster = Arc::new(Broadcaster::new());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (input_tx, input_rx) = mpsc::channel(PEER_INPUT_CHANNEL_CAPACITY);

        let peers = PeerTransport::new(
            PeerTransportConfig::from_engine_config(&config),
            Arc::clone(&broadcaster),
            input_tx,
            events.clone(),
        )?;

        info!(
            core_path = %config.core_path.display(),
            tick_rate = config.tick_rate,
            "Engine created"
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                core_factory,
                sessions: RwLock::new(HashMap::new()),
                next_order: AtomicU64::new(0),
                broadcaster,
                peers,
                router: InputRouter::new(),
                events,
                peer_input_rx: Mutex::new(Some(input_rx)),
            }),
        })
    }

    fn from_weak(weak: &Weak<EngineInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// The broadcast layer, for registering pub/sub sinks.
    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.inner.broadcaster
    }

    /// The peer transport.
    pub fn peers(&self) -> &PeerTransport {
        &self.inner.peers
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    fn entry(&self, id: &SessionId) -> EngineResult<Arc<SessionEntry>> {
        self.inner
            .sessions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    /// Register a session for the game image at `source`.
    #[instrument(name = "session_create", skip(self, source), fields(source = %source.as_ref().display()))]
    pub fn create(
        &self,
        source: impl AsRef<Path>,
        stream_mode: Option<StreamMode>,
    ) -> EngineResult<SessionSnapshot> {
        let source = source.as_ref();
        if !source.exists() {
            return Err(EngineError::SourceUnavailable(source.display().to_string()));
        }

        let id = SessionId::generate();
        let entry = Arc::new(SessionEntry::new(
            id.clone(),
            PathBuf::from(source),
            stream_mode.unwrap_or_default(),
            self.inner.config.tick_rate as f32,
            self.inner.next_order.fetch_add(1, Ordering::Relaxed),
        ));

        self.inner
            .sessions
            .write()
            .insert(id.clone(), Arc::clone(&entry));

        let _ = self.inner.events.send(EngineEvent::SessionStateChanged {
            session_id: id.clone(),
            previous: SessionState::Created,
            current: SessionState::Created,
        });
        info!(session_id = %id, "Session created");

        Ok(entry.snapshot())
    }

    /// Load the core and game and start the capture loop.
    #[instrument(name = "session_start", skip(self, id), fields(session_id = %id))]
    pub async fn start(&self, id: &SessionId) -> EngineResult<SessionSnapshot> {
        let entry = self.entry(id)?;
        let mut capture = entry.capture.lock().await;

        if entry.is_removed() {
            return Err(EngineError::NotFound(id.to_string()));
        }
        if entry.state().is_running() {
            return Err(EngineError::AlreadyRunning(id.to_string()));
        }

        // A loop that gave up on its own is reaped before restarting.
        if let Some(previous) = capture.take() {
            previous.stop().await;
        }

        info!("Starting session");

        let factory = Arc::clone(&self.inner.core_factory);
        let core_path = self.inner.config.core_path.clone();
        let source = entry.source.clone();
        let core = tokio::task::spawn_blocking(move || {
            let mut startup = CoreStartup::new();
            startup.initialize(&factory, &core_path, &source, StartupPhase::SpawnLoop)?;
            startup
                .take_core()
                .ok_or_else(|| EngineError::Internal("startup produced no core".to_string()))
        })
        .await
        .map_err(|e| EngineError::Internal(e.to_string()))??;

        let (input_tx, input_rx) = input_channel();
        let capture_loop = CaptureLoop {
            session_id: id.clone(),
            core,
            input_rx,
            broadcaster: Arc::clone(&self.inner.broadcaster),
            stream_mode: Arc::clone(&entry.stream_mode),
            metrics: Arc::clone(&entry.metrics),
            tick_interval: self.inner.config.tick_interval(),
            max_consecutive_failures: self.inner.config.max_consecutive_tick_failures.max(1),
        };

        // Running before the thread exists, so a fast failure cannot be overwritten.
        let previous = entry.transition(SessionState::Running, &self.inner.events);
        entry.metrics.start();
        self.inner.router.attach(id, input_tx);

        let weak = Arc::downgrade(&self.inner);
        let failed_id = id.clone();
        let runtime = Handle::current();
        let spawned = CaptureHandle::spawn(capture_loop, move |reason| {
            if let Some(engine) = Engine::from_weak(&weak) {
                engine.on_capture_failed(&failed_id, reason, &runtime);
            }
        });

        match spawned {
            Ok(handle) => {
                *capture = Some(handle);
                info!("Session running");
                Ok(entry.snapshot())
            }
            Err(e) => {
                error!("Failed to spawn capture thread: {}", e);
                self.inner.router.detach(id);
                entry.metrics.stop();
                entry.transition(previous, &self.inner.events);
                Err(EngineError::Internal(e.to_string()))
            }
        }
    }

    /// Runs on the capture thread after the loop gave up.
    fn on_capture_failed(&self, id: &SessionId, reason: StopReason, runtime: &Handle) {
        self.inner.router.detach(id);

        if let Ok(entry) = self.entry(id) {
            entry.metrics.stop();
            if entry.state().is_running() {
                error!(session_id = %id, "Session failed: {}", reason.message());
                entry.transition(
                    SessionState::Failed {
                        message: reason.message(),
                    },
                    &self.inner.events,
                );
            }
        }

        let peers = self.inner.peers.clone();
        let id = id.clone();
        runtime.spawn(async move {
            let closed = peers.close_for_game(&id).await;
            if closed > 0 {
                info!(session_id = %id, closed, "Closed peers of failed session");
            }
        });
    }

    /// Stop a session, release its core and remove it from the registry.
    #[instrument(name = "session_stop", skip(self, id), fields(session_id = %id))]
    pub async fn stop(&self, id: &SessionId) -> EngineResult<()> {
        let entry = self.entry(id)?;
        let mut capture = entry.capture.lock().await;

        if entry.is_removed() {
            return Err(EngineError::NotFound(id.to_string()));
        }

        info!("Stopping session");
        self.inner.router.detach(id);

        if let Some(handle) = capture.take() {
            handle.stop().await;
        }
        entry.metrics.stop();

        entry.mark_removed();
        self.inner.sessions.write().remove(id);
        entry.transition(SessionState::Stopped, &self.inner.events);
        let _ = self.inner.events.send(EngineEvent::SessionRemoved {
            session_id: id.clone(),
        });
        drop(capture);

        let closed = self.inner.peers.close_for_game(id).await;
        self.inner.broadcaster.remove_session(id);

        info!(closed_peers = closed, "Session stopped");
        Ok(())
    }

    /// Stop every session.
    pub async fn shutdown(&self) {
        let ids: Vec<SessionId> = self.inner.sessions.read().keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.stop(&id).await {
                debug!("{}", e);
            }
        }
    }

    /// Snapshot of one session.
    pub fn get(&self, id: &SessionId) -> Option<SessionSnapshot> {
        self.inner.sessions.read().get(id).map(|e| e.snapshot())
    }

    /// Snapshots of all sessions in creation order.
    pub fn list(&self) -> Vec<SessionSnapshot> {
        let mut entries: Vec<Arc<SessionEntry>> =
            self.inner.sessions.read().values().cloned().collect();
        entries.sort_by_key(|e| e.order);
        entries.iter().map(|e| e.snapshot()).collect()
    }

    /// Change which transports receive a session's media.
    pub fn set_stream_mode(&self, id: &SessionId, mode: StreamMode) -> EngineResult<()> {
        let entry = self.entry(id)?;
        let previous = std::mem::replace(&mut *entry.stream_mode.write(), mode);
        if previous != mode {
            info!(session_id = %id, from = previous.name(), to = mode.name(), "Stream mode changed");
            let _ = self.inner.events.send(EngineEvent::StreamModeChanged {
                session_id: id.clone(),
                previous,
                current: mode,
            });
        }
        Ok(())
    }

    /// Current stream mode of a session.
    pub fn stream_mode(&self, id: &SessionId) -> EngineResult<StreamMode> {
        Ok(self.entry(id)?.stream_mode())
    }

    /// Route a viewer input event to a session.
    pub fn route_input(&self, id: &SessionId, event: &InputEvent) -> RouteOutcome {
        self.inner.router.route(id, event)
    }

    /// Open a peer session for a viewer of `game_session_id`.
    pub async fn create_peer_session(
        &self,
        game_session_id: &SessionId,
        viewer_id: &ViewerId,
        outbox: mpsc::UnboundedSender<SignalingEvent>,
    ) -> EngineResult<(PeerSessionId, SessionDescription)> {
        self.entry(game_session_id)?;
        let (peer_id, offer) = self
            .inner
            .peers
            .create_session(game_session_id, viewer_id, outbox)
            .await?;

        // `stop` removes the entry before closing the game's peers, so a
        // session still registered here will see this peer in that sweep.
        if let Err(e) = self.entry(game_session_id) {
            debug!(peer_id = %peer_id, "Game session stopped during peer setup");
            if let Err(close) = self.inner.peers.close(&peer_id).await {
                trace!("{}", close);
            }
            return Err(e);
        }
        Ok((peer_id, offer))
    }

    /// Register a media sink on a running game session.
    ///
    /// Registration is undone if the session is stopped concurrently, so a
    /// returned sink is always closed by that session's `stop`.
    pub fn subscribe_media(
        &self,
        id: &SessionId,
        kind: SinkKind,
    ) -> EngineResult<Arc<MediaSink>> {
        self.entry(id)?;
        let sink = self.inner.broadcaster.register_sink(id, kind);
        if let Err(e) = self.entry(id) {
            self.inner.broadcaster.unregister_sink(id, sink.id());
            return Err(e);
        }
        Ok(sink)
    }

    /// Forward input received on peer data channels to the router.
    ///
    /// Returns `None` if the forwarder was already started.
    pub fn spawn_input_forwarder(&self) -> Option<JoinHandle<()>> {
        let mut rx = self.inner.peer_input_rx.lock().take()?;
        let weak = Arc::downgrade(&self.inner);

        Some(tokio::spawn(async move {
            while let Some(input) = rx.recv().await {
                let Some(engine) = Engine::from_weak(&weak) else {
                    break;
                };
                let outcome = engine.route_input(&input.game_session_id, &input.event);
                trace!(
                    session_id = %input.game_session_id,
                    outcome = outcome.name(),
                    "Peer input"
                );
            }
            debug!("Peer input forwarder finished");
        }))
    }
}
