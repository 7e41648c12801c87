//! Native libretro core support.
//!
//! libretro delivers video, audio and input through process-wide callbacks
//! with no user-data pointer, so their state lives in a global and only one
//! native core may be active at a time.

mod callbacks;
mod core;
mod ffi;
mod pixel;

pub use self::core::NativeCore;
pub use pixel::{convert_to_rgba, PixelFormat};
