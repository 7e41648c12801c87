//! Lifecycle state types.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a game session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SessionState {
    /// Session exists but the core is not running.
    #[default]
    Created,

    /// Capture loop is active.
    Running,

    /// Session was stopped and its resources released.
    Stopped,

    /// Capture loop gave up after repeated tick failures.
    Failed {
        /// Last failure cause.
        message: String,
    },
}

impl SessionState {
    /// Returns true if the session is in the Created state.
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created)
    }

    /// Returns true if the capture loop is running.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns true if the session is stopped.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Returns true if the session ended in error.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Returns a simple string representation of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Startup phases for a session, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartupPhase {
    /// Loading the emulation core module.
    LoadCore,

    /// Loading the game into the core.
    LoadGame,

    /// Spawning the capture loop.
    SpawnLoop,
}

impl StartupPhase {
    /// Returns the next phase, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::LoadCore => Some(Self::LoadGame),
            Self::LoadGame => Some(Self::SpawnLoop),
            Self::SpawnLoop => None,
        }
    }

    /// Returns the previous phase, if any (for rollback).
    pub fn previous(self) -> Option<Self> {
        match self {
            Self::LoadCore => None,
            Self::LoadGame => Some(Self::LoadCore),
            Self::SpawnLoop => Some(Self::LoadGame),
        }
    }

    /// Returns the display name for this phase.
    pub fn name(self) -> &'static str {
        match self {
            Self::LoadCore => "Loading core",
            Self::LoadGame => "Loading game",
            Self::SpawnLoop => "Starting capture loop",
        }
    }
}

/// Reason a capture loop ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Explicit stop request.
    UserRequested,

    /// Too many consecutive tick failures.
    TickFailures { count: u32, message: String },
}

impl StopReason {
    /// Returns a display message for this reason.
    pub fn message(&self) -> String {
        match self {
            Self::UserRequested => "Session stopped by request".to_string(),
            Self::TickFailures { count, message } => {
                format!("{count} consecutive tick failures, last: {message}")
            }
        }
    }
}

/// Signaling state of one peer session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PeerState {
    #[default]
    Idle,
    Offering,
    AwaitingAnswer,
    Connected,
    Disconnected,
    Closed,
}

impl PeerState {
    /// Returns true once the peer session has been torn down.
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns true while media should flow.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns a simple string representation of the state.
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Offering => "offering",
            Self::AwaitingAnswer => "awaiting-answer",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Closed => "closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_phases_walk_both_ways() {
        let mut phase = StartupPhase::LoadCore;
        let mut forward = vec![phase];
        while let Some(next) = phase.next() {
            forward.push(next);
            phase = next;
        }
        assert_eq!(
            forward,
            vec![StartupPhase::LoadCore, StartupPhase::LoadGame, StartupPhase::SpawnLoop]
        );
        assert_eq!(StartupPhase::SpawnLoop.previous(), Some(StartupPhase::LoadGame));
        assert_eq!(StartupPhase::LoadCore.previous(), None);
    }

    #[test]
    fn test_session_state_serializes_with_status_tag() {
        let json = serde_json::to_value(SessionState::Failed {
            message: "boom".into(),
        })
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["message"], "boom");
        assert_eq!(
            serde_json::to_value(SessionState::Running).unwrap()["status"],
            "running"
        );
    }

    #[test]
    fn test_stop_reason_message() {
        let reason = StopReason::TickFailures {
            count: 3,
            message: "no frame".into(),
        };
        assert_eq!(reason.message(), "3 consecutive tick failures, last: no frame");
    }
}
