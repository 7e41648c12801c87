//! RGBA to planar YUV 4:2:0 conversion (BT.601, studio range).

use crate::{EncoderError, EncoderResult};

#[inline]
fn clamp8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Size of an I420 buffer for the given dimensions.
pub fn i420_buffer_size(width: u32, height: u32) -> usize {
    let (w, h) = (width as usize, height as usize);
    w * h + 2 * (w / 2) * (h / 2)
}

/// Convert a tightly packed RGBA frame to I420 (Y plane, then U, then V).
///
/// Chroma is taken from the top-left pixel of each 2x2 block. Dimensions must
/// be non-zero and even.
pub fn rgba_to_i420(rgba: &[u8], width: u32, height: u32) -> EncoderResult<Vec<u8>> {
    if width == 0 || height == 0 {
        return Err(EncoderError::InvalidInput(format!(
            "zero frame dimension {}x{}",
            width, height
        )));
    }
    if width % 2 != 0 || height % 2 != 0 {
        return Err(EncoderError::InvalidInput(format!(
            "odd frame dimension {}x{}",
            width, height
        )));
    }

    let (w, h) = (width as usize, height as usize);
    if rgba.len() != w * h * 4 {
        return Err(EncoderError::InvalidInput(format!(
            "expected {} bytes ({}x{} RGBA), got {}",
            w * h * 4,
            width,
            height,
            rgba.len()
        )));
    }

    let y_size = w * h;
    let chroma_w = w / 2;
    let chroma_size = chroma_w * (h / 2);

    let mut out = vec![0u8; y_size + 2 * chroma_size];
    let (y_plane, chroma) = out.split_at_mut(y_size);
    let (u_plane, v_plane) = chroma.split_at_mut(chroma_size);

    for row in 0..h {
        for col in 0..w {
            let px = (row * w + col) * 4;
            let r = i32::from(rgba[px]);
            let g = i32::from(rgba[px + 1]);
            let b = i32::from(rgba[px + 2]);

            y_plane[row * w + col] = clamp8(((66 * r + 129 * g + 25 * b + 128) >> 8) + 16);

            if row % 2 == 0 && col % 2 == 0 {
                let ci = (row / 2) * chroma_w + col / 2;
                u_plane[ci] = clamp8(((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128);
                v_plane[ci] = clamp8(((112 * r - 94 * g - 18 * b + 128) >> 8) + 128);
            }
        }
    }

    Ok(out)
}
