//! Stable error kinds reported to callers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error taxonomy shared by every control-surface failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unknown session or peer id.
    NotFound,

    /// Start requested on a running session.
    AlreadyRunning,

    /// The session source could not be resolved.
    SourceUnavailable,

    /// The emulation core module was rejected.
    CoreLoadFailed,

    /// The core rejected the game.
    GameLoadFailed,

    /// Offer/answer/candidate could not be applied.
    NegotiationFailed,

    /// A capture tick failed.
    TickFailure,

    /// A payload could not be parsed.
    MalformedMessage,

    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Stable string name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::AlreadyRunning => "already_running",
            Self::SourceUnavailable => "source_unavailable",
            Self::CoreLoadFailed => "core_load_failed",
            Self::GameLoadFailed => "game_load_failed",
            Self::NegotiationFailed => "negotiation_failed",
            Self::TickFailure => "tick_failure",
            Self::MalformedMessage => "malformed_message",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error body: a stable kind plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorBody {
    /// Create a new error body.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serialization_matches_as_str() {
        for kind in [
            ErrorKind::NotFound,
            ErrorKind::AlreadyRunning,
            ErrorKind::SourceUnavailable,
            ErrorKind::CoreLoadFailed,
            ErrorKind::GameLoadFailed,
            ErrorKind::NegotiationFailed,
            ErrorKind::TickFailure,
            ErrorKind::MalformedMessage,
            ErrorKind::Internal,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }
}
