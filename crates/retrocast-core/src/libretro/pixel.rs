//! Conversion of libretro pixel formats to RGBA.

use super::ffi;

/// Pixel formats a libretro core may announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// 15-bit, top bit unused. libretro's default.
    #[default]
    Rgb1555,

    /// 32-bit, top byte unused.
    Xrgb8888,

    /// 16-bit 5:6:5.
    Rgb565,
}

impl PixelFormat {
    /// Map a libretro `RETRO_PIXEL_FORMAT_*` value.
    pub fn from_raw(value: u32) -> Option<Self> {
        match value {
            ffi::RETRO_PIXEL_FORMAT_0RGB1555 => Some(Self::Rgb1555),
            ffi::RETRO_PIXEL_FORMAT_XRGB8888 => Some(Self::Xrgb8888),
            ffi::RETRO_PIXEL_FORMAT_RGB565 => Some(Self::Rgb565),
            _ => None,
        }
    }

    /// Bytes per source pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb1555 | Self::Rgb565 => 2,
            Self::Xrgb8888 => 4,
        }
    }
}

#[inline]
fn expand5(v: u32) -> u8 {
    ((v << 3) | (v >> 2)) as u8
}

#[inline]
fn expand6(v: u32) -> u8 {
    ((v << 2) | (v >> 4)) as u8
}

/// Convert a strided source frame into tightly packed RGBA with opaque alpha.
///
/// `src` must hold at least `pitch * (height - 1) + width * bpp` bytes.
/// Returns `false` (leaving `out` untouched) when it does not.
pub fn convert_to_rgba(
    format: PixelFormat,
    src: &[u8],
    width: usize,
    height: usize,
    pitch: usize,
    out: &mut Vec<u8>,
) -> bool {
    let bpp = format.bytes_per_pixel();
    let row_bytes = width * bpp;
    if width == 0 || height == 0 || pitch < row_bytes {
        return false;
    }
    if src.len() < pitch * (height - 1) + row_bytes {
        return false;
    }

    out.clear();
    out.reserve(width * height * 4);

    for y in 0..height {
        let row = &src[y * pitch..y * pitch + row_bytes];
        match format {
            PixelFormat::Rgb565 => {
                for px in row.chunks_exact(2) {
                    let p = u32::from(u16::from_ne_bytes([px[0], px[1]]));
                    out.extend_from_slice(&[
                        expand5((p >> 11) & 0x1f),
                        expand6((p >> 5) & 0x3f),
                        expand5(p & 0x1f),
                        0xff,
                    ]);
                }
            }
            PixelFormat::Rgb1555 => {
                for px in row.chunks_exact(2) {
                    let p = u32::from(u16::from_ne_bytes([px[0], px[1]]));
                    out.extend_from_slice(&[
                        expand5((p >> 10) & 0x1f),
                        expand5((p >> 5) & 0x1f),
                        expand5(p & 0x1f),
                        0xff,
                    ]);
                }
            }
            PixelFormat::Xrgb8888 => {
                for px in row.chunks_exact(4) {
                    let p = u32::from_ne_bytes([px[0], px[1], px[2], px[3]]);
                    out.extend_from_slice(&[(p >> 16) as u8, (p >> 8) as u8, p as u8, 0xff]);
                }
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb565(r: u16, g: u16, b: u16) -> [u8; 2] {
        ((r << 11) | (g << 5) | b).to_ne_bytes()
    }

    #[test]
    fn test_rgb565_primaries() {
        let mut src = Vec::new();
        src.extend_from_slice(&rgb565(0x1f, 0, 0));
        src.extend_from_slice(&rgb565(0, 0x3f, 0));
        src.extend_from_slice(&rgb565(0, 0, 0x1f));
        src.extend_from_slice(&rgb565(0, 0, 0));

        let mut out = Vec::new();
        assert!(convert_to_rgba(PixelFormat::Rgb565, &src, 4, 1, 8, &mut out));
        assert_eq!(
            out,
            vec![255, 0, 0, 255, 0, 255, 0, 255, 0, 0, 255, 255, 0, 0, 0, 255]
        );
    }

    #[test]
    fn test_rgb565_mid_value_expansion() {
        // r5 = 16 -> (16 << 3) | (16 >> 2) = 132
        let src = rgb565(16, 0, 0);
        let mut out = Vec::new();
        assert!(convert_to_rgba(PixelFormat::Rgb565, &src, 1, 1, 2, &mut out));
        assert_eq!(out, vec![132, 0, 0, 255]);
    }

    #[test]
    fn test_pitch_padding_is_skipped() {
        // Two rows of one XRGB pixel each, pitch 8 with 4 bytes of padding.
        let mut src = Vec::new();
        src.extend_from_slice(&0x00112233u32.to_ne_bytes());
        src.extend_from_slice(&[0xaa; 4]);
        src.extend_from_slice(&0x00445566u32.to_ne_bytes());

        let mut out = Vec::new();
        assert!(convert_to_rgba(PixelFormat::Xrgb8888, &src, 1, 2, 8, &mut out));
        assert_eq!(out, vec![0x11, 0x22, 0x33, 0xff, 0x44, 0x55, 0x66, 0xff]);
    }

    #[test]
    fn test_rgb1555_white() {
        let src = 0x7fffu16.to_ne_bytes();
        let mut out = Vec::new();
        assert!(convert_to_rgba(PixelFormat::Rgb1555, &src, 1, 1, 2, &mut out));
        assert_eq!(out, vec![255, 255, 255, 255]);
    }

    #[test]
    fn test_short_source_rejected() {
        let mut out = vec![9];
        assert!(!convert_to_rgba(PixelFormat::Rgb565, &[0u8; 3], 2, 1, 4, &mut out));
        assert_eq!(out, vec![9]);
    }

    #[test]
    fn test_format_from_raw() {
        assert_eq!(PixelFormat::from_raw(2), Some(PixelFormat::Rgb565));
        assert_eq!(PixelFormat::from_raw(1), Some(PixelFormat::Xrgb8888));
        assert_eq!(PixelFormat::from_raw(0), Some(PixelFormat::Rgb1555));
        assert_eq!(PixelFormat::from_raw(9), None);
    }
}
