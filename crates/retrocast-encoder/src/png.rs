//! PNG still encoding for pub/sub viewers.

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};

use crate::{EncoderError, EncoderResult};

/// Encode a tightly packed RGBA frame as a lossless PNG.
pub fn encode_png(rgba: &[u8], width: u32, height: u32) -> EncoderResult<Vec<u8>> {
    let expected = width as usize * height as usize * 4;
    if width == 0 || height == 0 || rgba.len() != expected {
        return Err(EncoderError::InvalidInput(format!(
            "expected {} bytes ({}x{} RGBA), got {}",
            expected,
            width,
            height,
            rgba.len()
        )));
    }

    let mut png = Vec::with_capacity(expected / 4);
    PngEncoder::new(&mut png)
        .write_image(rgba, width, height, ExtendedColorType::Rgba8)
        .map_err(|e| EncoderError::Encoding(format!("PNG encode failed: {}", e)))?;
    Ok(png)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_signature_and_roundtrip() {
        let rgba = [10u8, 20, 30, 255, 40, 50, 60, 255];
        let png = encode_png(&rgba, 2, 1).unwrap();
        assert_eq!(&png[..8], &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]);

        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (2, 1));
        assert_eq!(decoded.into_raw(), rgba.to_vec());
    }

    #[test]
    fn test_png_rejects_mismatched_buffer() {
        assert!(matches!(
            encode_png(&[0u8; 7], 2, 1),
            Err(EncoderError::InvalidInput(_))
        ));
    }
}
