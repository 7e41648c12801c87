//! Stand-in core used when no libretro module is available.

use std::path::Path;

use bytes::Bytes;
use retrocast_ipc::JoypadButton;
use tracing::debug;

use crate::{CoreResult, EmulatorCore, BYTES_PER_PIXEL};

const STUB_WIDTH: u32 = 240;
const STUB_HEIGHT: u32 = 160;

/// Core that renders an opaque black frame and no audio.
#[derive(Debug)]
pub struct StubCore {
    frame: Bytes,
    buttons: [bool; JoypadButton::ALL.len()],
    frames_run: u64,
}

impl StubCore {
    /// Create a new stand-in core.
    pub fn new() -> Self {
        let mut pixels = vec![0u8; STUB_WIDTH as usize * STUB_HEIGHT as usize * BYTES_PER_PIXEL];
        for px in pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
            px[3] = 0xff;
        }

        Self {
            frame: Bytes::from(pixels),
            buttons: [false; JoypadButton::ALL.len()],
            frames_run: 0,
        }
    }

    /// Whether `button` is currently held.
    pub fn is_pressed(&self, button: JoypadButton) -> bool {
        self.buttons[button.code() as usize]
    }

    /// Number of frames run so far.
    pub fn frames_run(&self) -> u64 {
        self.frames_run
    }
}

impl Default for StubCore {
    fn default() -> Self {
        Self::new()
    }
}

impl EmulatorCore for StubCore {
    fn load_core(&mut self, path: &Path) -> CoreResult<()> {
        debug!(path = %path.display(), "Stand-in core ignoring module path");
        Ok(())
    }

    fn load_game(&mut self, path: &Path) -> CoreResult<()> {
        debug!(path = %path.display(), "Stand-in core ignoring game");
        Ok(())
    }

    fn run_frame(&mut self) -> CoreResult<()> {
        self.frames_run += 1;
        Ok(())
    }

    fn frame_buffer(&self) -> Option<Bytes> {
        Some(self.frame.clone())
    }

    fn frame_width(&self) -> u32 {
        STUB_WIDTH
    }

    fn frame_height(&self) -> u32 {
        STUB_HEIGHT
    }

    fn audio_buffer(&self) -> Option<Vec<i16>> {
        None
    }

    fn clear_audio_buffer(&mut self) {}

    fn set_input(&mut self, button: JoypadButton, pressed: bool) {
        self.buttons[button.code() as usize] = pressed;
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_frame_is_opaque_black() {
        let core = StubCore::new();
        let frame = core.frame_buffer().unwrap();
        assert_eq!(frame.len(), 240 * 160 * 4);
        assert!(frame.chunks_exact(4).all(|px| px == [0, 0, 0, 0xff]));
    }

    #[test]
    fn test_stub_tracks_input_and_frames() {
        let mut core = StubCore::new();
        core.set_input(JoypadButton::Start, true);
        core.run_frame().unwrap();
        core.run_frame().unwrap();
        assert!(core.is_pressed(JoypadButton::Start));
        assert!(!core.is_pressed(JoypadButton::A));
        assert_eq!(core.frames_run(), 2);
        assert!(core.audio_buffer().is_none());
    }
}
