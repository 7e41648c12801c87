//! Native libretro core loaded from a shared object.

use std::ffi::CString;
use std::path::Path;
use std::ptr;

use bytes::Bytes;
use libloading::Library;
use retrocast_ipc::JoypadButton;
use tracing::{debug, info, instrument, warn};

use super::callbacks::{self, SHARED};
use super::ffi::*;
use crate::{CoreError, CoreResult, EmulatorCore, DEFAULT_SAMPLE_RATE};

/// Entry points resolved from the module.
#[derive(Clone, Copy)]
struct CoreApi {
    deinit: RetroDeinitFn,
    run: RetroRunFn,
    load_game: RetroLoadGameFn,
    unload_game: RetroUnloadGameFn,
    get_system_av_info: RetroGetSystemAvInfoFn,
}

/// Resolve a symbol and copy the function pointer out of the library.
fn symbol<T: Copy>(library: &Library, name: &str) -> CoreResult<T> {
    let mut raw = name.as_bytes().to_vec();
    raw.push(0);
    // SAFETY: callers request symbols with the signature of the libretro ABI.
    unsafe {
        library
            .get::<T>(&raw)
            .map(|sym| *sym)
            .map_err(|_| CoreError::MissingSymbol(name.to_string()))
    }
}

/// A libretro core driven through its C ABI.
pub struct NativeCore {
    /// Declared before `library` so the pointers never outlive the module.
    api: Option<CoreApi>,
    library: Option<Library>,
    game_loaded: bool,
    sample_rate: u32,
}

impl NativeCore {
    /// Create an unloaded core.
    pub fn new() -> Self {
        Self {
            api: None,
            library: None,
            game_loaded: false,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }

    fn api(&self) -> CoreResult<CoreApi> {
        self.api.ok_or(CoreError::NotLoaded)
    }

    fn open(path: &Path) -> CoreResult<(Library, CoreApi)> {
        // SAFETY: loading a libretro module runs its initialisers; the path is
        // operator-provided configuration.
        let library = unsafe { Library::new(path) }
            .map_err(|e| CoreError::LoadFailed(format!("{}: {e}", path.display())))?;

        let set_environment: RetroSetEnvironmentFn = symbol(&library, "retro_set_environment")?;
        let set_video_refresh: RetroSetVideoRefreshFn =
            symbol(&library, "retro_set_video_refresh")?;
        let set_audio_sample: RetroSetAudioSampleFn = symbol(&library, "retro_set_audio_sample")?;
        let set_audio_sample_batch: RetroSetAudioSampleBatchFn =
            symbol(&library, "retro_set_audio_sample_batch")?;
        let set_input_poll: RetroSetInputPollFn = symbol(&library, "retro_set_input_poll")?;
        let set_input_state: RetroSetInputStateFn = symbol(&library, "retro_set_input_state")?;
        let init: RetroInitFn = symbol(&library, "retro_init")?;

        let api = CoreApi {
            deinit: symbol(&library, "retro_deinit")?,
            run: symbol(&library, "retro_run")?,
            load_game: symbol(&library, "retro_load_game")?,
            unload_game: symbol(&library, "retro_unload_game")?,
            get_system_av_info: symbol(&library, "retro_get_system_av_info")?,
        };

        // SAFETY: the callbacks match the libretro signatures and the module
        // stays loaded for as long as `api` is reachable.
        unsafe {
            set_environment(callbacks::environment);
            set_video_refresh(callbacks::video_refresh);
            set_audio_sample(callbacks::audio_sample);
            set_audio_sample_batch(callbacks::audio_sample_batch);
            set_input_poll(callbacks::input_poll);
            set_input_state(callbacks::input_state);
            init();
        }

        Ok((library, api))
    }
}

impl Default for NativeCore {
    fn default() -> Self {
        Self::new()
    }
}

impl EmulatorCore for NativeCore {
    #[instrument(name = "native_load_core", skip(self, path), fields(path = %path.display()))]
    fn load_core(&mut self, path: &Path) -> CoreResult<()> {
        if self.library.is_some() {
            return Ok(());
        }
        if !callbacks::acquire() {
            return Err(CoreError::CoreBusy);
        }
        SHARED.lock().reset();

        match Self::open(path) {
            Ok((library, api)) => {
                self.library = Some(library);
                self.api = Some(api);
                info!("Libretro core loaded");
                Ok(())
            }
            Err(e) => {
                callbacks::release();
                Err(e)
            }
        }
    }

    #[instrument(name = "native_load_game", skip(self, path), fields(path = %path.display()))]
    fn load_game(&mut self, path: &Path) -> CoreResult<()> {
        let api = self.api()?;
        let c_path = CString::new(path.to_string_lossy().as_bytes())
            .map_err(|_| CoreError::InvalidPath(path.display().to_string()))?;

        let info = RetroGameInfo {
            path: c_path.as_ptr(),
            data: ptr::null(),
            size: 0,
            meta: ptr::null(),
        };

        // SAFETY: `info` and `c_path` outlive the call.
        let loaded = unsafe { (api.load_game)(&info) };
        if !loaded {
            return Err(CoreError::GameLoadFailed(format!(
                "core rejected {}",
                path.display()
            )));
        }
        self.game_loaded = true;

        let mut av_info = RetroSystemAvInfo::default();
        // SAFETY: the core fills a caller-owned struct.
        unsafe { (api.get_system_av_info)(&mut av_info) };

        {
            let mut shared = SHARED.lock();
            shared.width = av_info.geometry.base_width;
            shared.height = av_info.geometry.base_height;
        }
        if av_info.timing.sample_rate > 0.0 {
            self.sample_rate = av_info.timing.sample_rate.round() as u32;
        }

        info!(
            width = av_info.geometry.base_width,
            height = av_info.geometry.base_height,
            fps = av_info.timing.fps,
            sample_rate = self.sample_rate,
            "Game loaded"
        );
        Ok(())
    }

    fn run_frame(&mut self) -> CoreResult<()> {
        let api = self.api()?;
        if !self.game_loaded {
            return Err(CoreError::NotLoaded);
        }
        // SAFETY: the callbacks only touch `SHARED`, which is not held here.
        unsafe { (api.run)() };
        Ok(())
    }

    fn frame_buffer(&self) -> Option<Bytes> {
        let shared = SHARED.lock();
        if !shared.has_frame {
            return None;
        }
        Some(Bytes::copy_from_slice(&shared.frame))
    }

    fn frame_width(&self) -> u32 {
        SHARED.lock().width
    }

    fn frame_height(&self) -> u32 {
        SHARED.lock().height
    }

    fn audio_buffer(&self) -> Option<Vec<i16>> {
        let shared = SHARED.lock();
        if shared.audio.is_empty() {
            None
        } else {
            Some(shared.audio.clone())
        }
    }

    fn clear_audio_buffer(&mut self) {
        SHARED.lock().audio.clear();
    }

    fn set_input(&mut self, button: JoypadButton, pressed: bool) {
        let mut shared = SHARED.lock();
        if let Some(slot) = shared.input.get_mut(button.code() as usize) {
            *slot = pressed;
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn name(&self) -> &'static str {
        "libretro"
    }
}

impl Drop for NativeCore {
    fn drop(&mut self) {
        let Some(api) = self.api.take() else {
            return;
        };

        // SAFETY: the module is still loaded; it is unloaded below.
        unsafe {
            if self.game_loaded {
                (api.unload_game)();
            }
            (api.deinit)();
        }

        if let Some(library) = self.library.take() {
            if let Err(e) = library.close() {
                warn!("Failed to unload libretro core: {}", e);
            }
        }

        callbacks::release();
        debug!("Native core released");
    }
}
