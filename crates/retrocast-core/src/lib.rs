//! Emulation core adapter.
//!
//! This crate exposes the emulation core as a narrow capability interface.
//! A native libretro module is used when present; otherwise a stand-in core
//! produces blank frames so the engine keeps working without it.

mod error;
mod frame;
mod libretro;
mod stub;

pub use error::CoreError;
pub use frame::{AudioChunk, CaptureTimestamp, Frame};
pub use libretro::{convert_to_rgba, NativeCore, PixelFormat};
pub use stub::StubCore;

use std::path::Path;

use bytes::Bytes;
use retrocast_ipc::JoypadButton;
use tracing::{info, warn};

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Bytes per pixel of the RGBA frames exposed by every core.
pub const BYTES_PER_PIXEL: usize = 4;

/// Audio channels produced by libretro cores (interleaved stereo).
pub const AUDIO_CHANNELS: u16 = 2;

/// Native audio rate of the GBA core, used until a core reports its own.
pub const DEFAULT_SAMPLE_RATE: u32 = 32_040;

/// Capability set of an emulation core.
///
/// Implementations are driven from a single capture thread; they need to be
/// `Send` so they can move there, not `Sync`.
pub trait EmulatorCore: Send {
    /// Load the core module at `path`.
    fn load_core(&mut self, path: &Path) -> CoreResult<()>;

    /// Load a game image into the core.
    fn load_game(&mut self, path: &Path) -> CoreResult<()>;

    /// Step the core by exactly one video frame.
    fn run_frame(&mut self) -> CoreResult<()>;

    /// Latest RGBA frame, if the core has rendered one.
    fn frame_buffer(&self) -> Option<Bytes>;

    /// Width of the latest frame in pixels.
    fn frame_width(&self) -> u32;

    /// Height of the latest frame in pixels.
    fn frame_height(&self) -> u32;

    /// Interleaved stereo samples accumulated since the last clear.
    fn audio_buffer(&self) -> Option<Vec<i16>>;

    /// Discard accumulated audio.
    fn clear_audio_buffer(&mut self);

    /// Set the held state of one joypad button.
    fn set_input(&mut self, button: JoypadButton, pressed: bool);

    /// Sample rate of [`EmulatorCore::audio_buffer`] in Hz.
    fn sample_rate(&self) -> u32 {
        DEFAULT_SAMPLE_RATE
    }

    /// Implementation name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Create a core for the module at `core_path`, falling back to the stand-in
/// when the module file does not exist.
pub fn create_core(core_path: &Path) -> Box<dyn EmulatorCore> {
    if core_path.is_file() {
        info!(path = %core_path.display(), "Using native libretro core");
        Box::new(NativeCore::new())
    } else {
        warn!(
            path = %core_path.display(),
            "Libretro core not found, falling back to stand-in core"
        );
        Box::new(StubCore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_module_selects_stub() {
        let core = create_core(Path::new("/definitely/not/here/core.so"));
        assert_eq!(core.name(), "stub");
    }

    #[test]
    fn test_existing_file_selects_native() {
        let path = std::env::temp_dir().join(format!("retrocast-fake-core-{}.so", std::process::id()));
        std::fs::write(&path, b"not really a shared object").unwrap();
        let core = create_core(&path);
        assert_eq!(core.name(), "libretro");
        let _ = std::fs::remove_file(&path);
    }
}
