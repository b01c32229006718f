//! JPEG decoding for Tight encoding.
//!
//! Tight rectangles may carry a baseline JPEG image. By default it is decoded
//! with the `image` crate; the optional `turbojpeg` feature switches to
//! libjpeg-turbo.

use crate::error::{Result, VncError};

#[cfg(feature = "turbojpeg")]
pub mod turbojpeg;

#[cfg(feature = "turbojpeg")]
pub use turbojpeg::TurboJpegDecoder;

/// A decoded image as packed 8-bit RGB.
#[derive(Debug, Clone)]
pub struct RgbImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// `width * height * 3` bytes, rows back to back.
    pub data: Vec<u8>,
}

/// Decodes a JPEG image to RGB.
///
/// # Errors
///
/// Returns [`VncError::Encoding`] if the data is not a decodable JPEG.
#[cfg(not(feature = "turbojpeg"))]
pub fn decode_rgb(jpeg: &[u8]) -> Result<RgbImage> {
    let img = image::load_from_memory_with_format(jpeg, image::ImageFormat::Jpeg)
        .map_err(|e| VncError::Encoding(format!("JPEG decode failed: {e}")))?
        .to_rgb8();
    Ok(RgbImage {
        width: img.width(),
        height: img.height(),
        data: img.into_raw(),
    })
}

/// Decodes a JPEG image to RGB.
///
/// # Errors
///
/// Returns [`VncError::Encoding`] if the data is not a decodable JPEG.
#[cfg(feature = "turbojpeg")]
pub fn decode_rgb(jpeg: &[u8]) -> Result<RgbImage> {
    let mut decoder = TurboJpegDecoder::new().map_err(VncError::Encoding)?;
    decoder.decompress_rgb(jpeg).map_err(VncError::Encoding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_is_an_error() {
        let err = decode_rgb(&[0x00, 0x01, 0x02, 0x03]).unwrap_err();
        assert!(matches!(err, VncError::Encoding(_)));
    }
}
