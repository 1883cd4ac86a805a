//! Delivery-format normalization.
//!
//! Providers return PNGs at whatever resolution the model produced.
//! For delivery every image is bounded to a sane edge length and
//! re-encoded as JPEG, which keeps chat uploads and the album well
//! under transport limits without a visible quality loss.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::GenericImageView;

use crate::store::StorageError;

/// Longest edge after optimization.
pub const MAX_DIMENSION: u32 = 2048;

const JPEG_QUALITY: u8 = 85;

/// Decode, bound to [`MAX_DIMENSION`], and re-encode as JPEG.
///
/// Images already within bounds are only re-encoded.
pub fn optimize_for_delivery(bytes: &[u8]) -> Result<Vec<u8>, StorageError> {
    let decoded =
        image::load_from_memory(bytes).map_err(|e| StorageError::Image(e.to_string()))?;

    let (width, height) = decoded.dimensions();
    let bounded = if width > MAX_DIMENSION || height > MAX_DIMENSION {
        decoded.resize(MAX_DIMENSION, MAX_DIMENSION, FilterType::Lanczos3)
    } else {
        decoded
    };

    let rgb = bounded.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| StorageError::Image(e.to_string()))?;
    Ok(out)
}
