//! Error types for the core adapter.

use thiserror::Error;

/// Errors that can occur while driving an emulation core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The core module could not be opened.
    #[error("Failed to load core module: {0}")]
    LoadFailed(String),

    /// A required libretro entry point is missing.
    #[error("Core module is missing symbol {0}")]
    MissingSymbol(String),

    /// Another native core instance owns the process-wide callbacks.
    #[error("Another native core instance is already active")]
    CoreBusy,

    /// The core rejected the game image.
    #[error("Failed to load game: {0}")]
    GameLoadFailed(String),

    /// Operation requires a loaded core or game.
    #[error("Core not loaded")]
    NotLoaded,

    /// Path cannot be handed to the core.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Frame buffer does not match the reported dimensions.
    #[error("Frame buffer is {actual} bytes, expected {expected}")]
    InvalidFrame { expected: usize, actual: usize },
}
