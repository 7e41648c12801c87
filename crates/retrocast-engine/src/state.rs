//! Session entries and phased startup.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use retrocast_core::EmulatorCore;
use retrocast_ipc::{
    EngineEvent, SessionId, SessionSnapshot, SessionState, StartupPhase, StreamMode,
};

use crate::capture::CaptureHandle;
use crate::metrics::MetricsCollector;
use crate::orchestrator::CoreFactory;
use crate::{EngineError, EngineResult};

/// One registered session.
pub(crate) struct SessionEntry {
    pub id: SessionId,
    pub source: PathBuf,
    pub created_at_ms: u64,

    /// Insertion order, for stable listing.
    pub order: u64,

    state: RwLock<SessionState>,

    /// Read by the capture loop on every tick.
    pub stream_mode: Arc<RwLock<StreamMode>>,

    pub metrics: Arc<MetricsCollector>,

    /// Serializes start and stop; holds the running loop, if any.
    pub capture: tokio::sync::Mutex<Option<CaptureHandle>>,

    removed: AtomicBool,
}

impl SessionEntry {
    pub fn new(
        id: SessionId,
        source: PathBuf,
        stream_mode: StreamMode,
        target_tick_rate: f32,
        order: u64,
    ) -> Self {
        Self {
            id,
            source,
            created_at_ms: unix_ms(),
            order,
            state: RwLock::new(SessionState::Created),
            stream_mode: Arc::new(RwLock::new(stream_mode)),
            metrics: Arc::new(MetricsCollector::new(target_tick_rate)),
            capture: tokio::sync::Mutex::new(None),
            removed: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.read().clone()
    }

    pub fn stream_mode(&self) -> StreamMode {
        *self.stream_mode.read()
    }

    /// Move to `new_state` and announce it. Returns the previous state.
    pub fn transition(
        &self,
        new_state: SessionState,
        events: &broadcast::Sender<EngineEvent>,
    ) -> SessionState {
        let previous = {
            let mut state = self.state.write();
            std::mem::replace(&mut *state, new_state.clone())
        };

        debug!(
            session_id = %self.id,
            previous = %previous.name(),
            current = %new_state.name(),
            "State transition"
        );

        let _ = events.send(EngineEvent::SessionStateChanged {
            session_id: self.id.clone(),
            previous: previous.clone(),
            current: new_state,
        });
        previous
    }

    /// Mark the entry as gone from the registry.
    pub fn mark_removed(&self) {
        self.removed.store(true, Ordering::SeqCst);
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            source: self.source.display().to_string(),
            state: self.state(),
            stream_mode: self.stream_mode(),
            created_at_ms: self.created_at_ms,
            metrics: self.metrics.snapshot(),
        }
    }
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Core startup, phase by phase, with rollback of what already succeeded.
pub(crate) struct CoreStartup {
    core: Option<Box<dyn EmulatorCore>>,
    completed: Option<StartupPhase>,
}

impl CoreStartup {
    pub fn new() -> Self {
        Self {
            core: None,
            completed: None,
        }
    }

    /// Run phases up to and including `target_phase`.
    #[instrument(name = "core_startup", skip(self, factory, core_path, source))]
    pub fn initialize(
        &mut self,
        factory: &CoreFactory,
        core_path: &Path,
        source: &Path,
        target_phase: StartupPhase,
    ) -> EngineResult<()> {
        let mut phase = StartupPhase::LoadCore;

        loop {
            debug!("Startup phase: {}", phase.name());
            if let Err(e) = self.init_phase(factory, core_path, source, phase) {
                warn!("Startup failed during '{}': {}", phase.name(), e);
                self.rollback();
                return Err(e);
            }
            self.completed = Some(phase);

            if phase == target_phase {
                return Ok(());
            }
            match phase.next() {
                Some(next) => phase = next,
                None => return Ok(()),
            }
        }
    }

    fn init_phase(
        &mut self,
        factory: &CoreFactory,
        core_path: &Path,
        source: &Path,
        phase: StartupPhase,
    ) -> EngineResult<()> {
        match phase {
            StartupPhase::LoadCore => {
                let mut core = factory(core_path);
                core.load_core(core_path)
                    .map_err(|e| EngineError::CoreLoadFailed(e.to_string()))?;
                info!(core = core.name(), "Core loaded");
                self.core = Some(core);
            }
            StartupPhase::LoadGame => {
                let core = self
                    .core
                    .as_mut()
                    .ok_or_else(|| EngineError::Internal("core not loaded".to_string()))?;
                core.load_game(source)
                    .map_err(|e| EngineError::GameLoadFailed(e.to_string()))?;
                info!(source = %source.display(), "Game loaded");
            }
            // Spawned by the registry, which owns the thread handle.
            StartupPhase::SpawnLoop => {}
        }
        Ok(())
    }

    /// Undo completed phases in reverse order.
    pub fn rollback(&mut self) {
        let mut phase = self.completed.take();
        while let Some(current) = phase {
            debug!("Rolling back: {}", current.name());
            if current == StartupPhase::LoadCore {
                // Dropping the core unloads the game and the module.
                self.core = None;
            }
            phase = current.previous();
        }
        self.core = None;
    }

    /// Hand over the loaded core.
    pub fn take_core(&mut self) -> Option<Box<dyn EmulatorCore>> {
        self.completed = None;
        self.core.take()
    }
}
