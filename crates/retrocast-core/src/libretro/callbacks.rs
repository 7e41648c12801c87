//! Process-wide callback state shared with the native core.

use std::ffi::{c_uint, c_void};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{const_mutex, Mutex};
use tracing::{debug, trace};

use super::ffi;
use super::pixel::{convert_to_rgba, PixelFormat};

/// Upper bound on buffered audio (two seconds of 48 kHz stereo).
const MAX_AUDIO_SAMPLES: usize = 48_000 * 2 * 2;

/// Joypad ids the core may query.
const INPUT_SLOTS: usize = 16;

/// Buffers written by core callbacks and read by [`super::NativeCore`].
pub(crate) struct SharedState {
    pub pixel_format: PixelFormat,
    pub frame: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub has_frame: bool,
    pub audio: Vec<i16>,
    pub input: [bool; INPUT_SLOTS],
}

impl SharedState {
    const fn new() -> Self {
        Self {
            pixel_format: PixelFormat::Rgb1555,
            frame: Vec::new(),
            width: 0,
            height: 0,
            has_frame: false,
            audio: Vec::new(),
            input: [false; INPUT_SLOTS],
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn push_audio(&mut self, samples: &[i16]) {
        if self.audio.len() + samples.len() > MAX_AUDIO_SAMPLES {
            let excess = (self.audio.len() + samples.len()).saturating_sub(MAX_AUDIO_SAMPLES);
            let drain = excess.min(self.audio.len());
            self.audio.drain(..drain);
        }
        self.audio.extend_from_slice(samples);
    }
}

pub(crate) static SHARED: Mutex<SharedState> = const_mutex(SharedState::new());

/// Set while a native core owns the callbacks.
static ACTIVE: AtomicBool = AtomicBool::new(false);

/// Claim the callback slot. Returns `false` if another core holds it.
pub(crate) fn acquire() -> bool {
    ACTIVE
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

/// Release the callback slot.
pub(crate) fn release() {
    SHARED.lock().reset();
    ACTIVE.store(false, Ordering::Release);
}

pub(crate) unsafe extern "C" fn environment(cmd: c_uint, data: *mut c_void) -> bool {
    match cmd {
        ffi::RETRO_ENVIRONMENT_SET_PIXEL_FORMAT => {
            if data.is_null() {
                return false;
            }
            let raw = *(data as *const c_uint);
            match PixelFormat::from_raw(raw) {
                Some(format) => {
                    debug!(?format, "Core selected pixel format");
                    SHARED.lock().pixel_format = format;
                    true
                }
                None => false,
            }
        }
        ffi::RETRO_ENVIRONMENT_GET_CAN_DUPE => {
            if !data.is_null() {
                *(data as *mut bool) = true;
            }
            true
        }
        _ => {
            trace!(cmd, "Unhandled environment command");
            false
        }
    }
}

pub(crate) unsafe extern "C" fn video_refresh(
    data: *const c_void,
    width: c_uint,
    height: c_uint,
    pitch: usize,
) {
    // NULL means the core duplicated the previous frame.
    if data.is_null() || width == 0 || height == 0 {
        return;
    }

    let mut shared = SHARED.lock();
    let format = shared.pixel_format;
    let (w, h) = (width as usize, height as usize);
    let len = pitch * (h - 1) + w * format.bytes_per_pixel();
    let src = std::slice::from_raw_parts(data as *const u8, len);

    let mut frame = std::mem::take(&mut shared.frame);
    if convert_to_rgba(format, src, w, h, pitch, &mut frame) {
        shared.width = width;
        shared.height = height;
        shared.has_frame = true;
    }
    shared.frame = frame;
}

pub(crate) unsafe extern "C" fn audio_sample(left: i16, right: i16) {
    SHARED.lock().push_audio(&[left, right]);
}

pub(crate) unsafe extern "C" fn audio_sample_batch(data: *const i16, frames: usize) -> usize {
    if data.is_null() {
        return 0;
    }
    let samples = std::slice::from_raw_parts(data, frames * 2);
    SHARED.lock().push_audio(samples);
    frames
}

pub(crate) unsafe extern "C" fn input_poll() {}

pub(crate) unsafe extern "C" fn input_state(
    port: c_uint,
    device: c_uint,
    _index: c_uint,
    id: c_uint,
) -> i16 {
    if port != 0 || device != ffi::RETRO_DEVICE_JOYPAD {
        return 0;
    }
    let shared = SHARED.lock();
    match shared.input.get(id as usize) {
        Some(true) => 1,
        _ => 0,
    }
}
