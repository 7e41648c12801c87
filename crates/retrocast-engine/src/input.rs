//! Viewer input routing.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::{Sender, TrySendError};
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use retrocast_ipc::{InputEvent, JoypadButton, SessionId};

/// What happened to one routed input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Queued for the next tick.
    Delivered,

    /// The button name is not a joypad button.
    UnknownButton,

    /// The session is not running.
    NotRunning,

    /// The session's input queue was full.
    Dropped,
}

impl RouteOutcome {
    /// Returns the display name for this outcome.
    pub fn name(self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::UnknownButton => "unknown_button",
            Self::NotRunning => "not_running",
            Self::Dropped => "dropped",
        }
    }
}

/// Routes input events to the capture loops of running sessions.
///
/// Only running sessions have a route; events for anything else are dropped
/// immediately and never queued for a later run.
#[derive(Clone, Default)]
pub struct InputRouter {
    routes: Arc<RwLock<HashMap<SessionId, Sender<(JoypadButton, bool)>>>>,
}

impl InputRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the input queue of a session that just started running.
    pub(crate) fn attach(&self, session_id: &SessionId, tx: Sender<(JoypadButton, bool)>) {
        self.routes.write().insert(session_id.clone(), tx);
    }

    /// Remove a session's route. Queued events die with the receiver.
    pub(crate) fn detach(&self, session_id: &SessionId) {
        self.routes.write().remove(session_id);
    }

    /// Whether a session currently accepts input.
    pub fn is_attached(&self, session_id: &SessionId) -> bool {
        self.routes.read().contains_key(session_id)
    }

    /// Route one event. Never fails; the outcome is for observability.
    pub fn route(&self, session_id: &SessionId, event: &InputEvent) -> RouteOutcome {
        let Some(button) = JoypadButton::from_name(&event.button) else {
            warn!(session_id = %session_id, button = %event.button, "Unknown button");
            return RouteOutcome::UnknownButton;
        };

        let tx = match self.routes.read().get(session_id) {
            Some(tx) => tx.clone(),
            None => {
                trace!(session_id = %session_id, "Input for idle session dropped");
                return RouteOutcome::NotRunning;
            }
        };

        match tx.try_send((button, event.pressed)) {
            Ok(()) => RouteOutcome::Delivered,
            Err(TrySendError::Full(_)) => {
                debug!(session_id = %session_id, "Input queue full, dropping event");
                RouteOutcome::Dropped
            }
            Err(TrySendError::Disconnected(_)) => RouteOutcome::NotRunning,
        }
    }
}
