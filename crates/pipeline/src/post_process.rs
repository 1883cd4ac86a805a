//! Premium enhancement sub-pipeline.
//!
//! Runs per image: safety screen, artifact detection with optional
//! inpainting, contrast normalization, and a bounded 4K upscale. Every
//! step degrades to a pass-through on failure -- an enhancement problem
//! must never cost the user a photo they already paid for, so the
//! worst case is delivering the unenhanced original.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, RgbImage};

use atelier_provider::ImageCuration;
use atelier_storage::AssetFetcher;

/// Upscale target bound (4K UHD). Images are fitted inside, never
/// stretched beyond their aspect ratio.
pub const UPSCALE_WIDTH: u32 = 3840;
pub const UPSCALE_HEIGHT: u32 = 2160;

/// Luma gradient above this counts as an edge pixel.
const EDGE_MAGNITUDE_THRESHOLD: f32 = 128.0;

/// Percentile clipped away on each side by contrast normalization.
const CONTRAST_CLIP_PERCENT: f32 = 0.01;

const OUTPUT_JPEG_QUALITY: u8 = 90;

/// Tunables for one enhancement run.
#[derive(Debug, Clone)]
pub struct EnhanceSettings {
    /// Safety score at or above which enhancement is skipped.
    pub unsafe_score_threshold: f32,
    /// Edge-pixel ratio above which the image is considered artifacted.
    pub edge_ratio_threshold: f32,
    pub upscale_width: u32,
    pub upscale_height: u32,
}

impl Default for EnhanceSettings {
    fn default() -> Self {
        Self {
            unsafe_score_threshold: 0.7,
            edge_ratio_threshold: 0.15,
            upscale_width: UPSCALE_WIDTH,
            upscale_height: UPSCALE_HEIGHT,
        }
    }
}

/// Enhance one delivered image, returning the bytes to store.
///
/// Infallible by contract: every failure path returns the best bytes
/// produced so far, ultimately the unmodified input.
pub async fn curate_image(
    input: Vec<u8>,
    curation: &dyn ImageCuration,
    fetcher: &dyn AssetFetcher,
    settings: &EnhanceSettings,
) -> Vec<u8> {
    // Safety screen. Flagged images are delivered as-is; an unreachable
    // classifier must not block the whole batch.
    match curation.unsafe_score(&input).await {
        Ok(score) if score >= settings.unsafe_score_threshold => {
            tracing::warn!(score, "image flagged by safety screen, skipping enhancement");
            return input;
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(error = %e, "safety screen unavailable, continuing");
        }
    }

    let decoded = match image::load_from_memory(&input) {
        Ok(img) => img,
        Err(e) => {
            tracing::warn!(error = %e, "undecodable image, delivering as received");
            return input;
        }
    };

    // Artifact repair: a high edge ratio usually means generation
    // artifacts; hand the image to the inpainting model if it is
    // reachable and keep the original otherwise.
    let mut current_bytes = input.clone();
    let mut current_image = decoded;
    let ratio = edge_density(&current_image.to_luma8());
    if ratio > settings.edge_ratio_threshold {
        tracing::info!(edge_ratio = ratio, "artifact repair triggered");
        match curation.inpaint(&current_bytes).await {
            Ok(Some(url)) => match fetcher.fetch(&url).await {
                Ok(bytes) => match image::load_from_memory(&bytes) {
                    Ok(img) => {
                        current_bytes = bytes;
                        current_image = img;
                    }
                    Err(e) => tracing::warn!(error = %e, "inpainted image undecodable, keeping original"),
                },
                Err(e) => tracing::warn!(error = %e, "inpainted image unreachable, keeping original"),
            },
            Ok(None) => tracing::debug!("inpainting declined the image"),
            Err(e) => tracing::warn!(error = %e, "inpainting unavailable, keeping original"),
        }
    }

    // CPU-bound tail: contrast stretch, bounded upscale, re-encode.
    let (width, height) = (settings.upscale_width, settings.upscale_height);
    let result = tokio::task::spawn_blocking(move || {
        let stretched = normalize_contrast(current_image.to_rgb8());
        let upscaled = upscale(DynamicImage::ImageRgb8(stretched), width, height);
        encode_jpeg(&upscaled.to_rgb8())
    })
    .await;

    match result {
        Ok(Some(bytes)) => bytes,
        Ok(None) => current_bytes,
        Err(e) => {
            tracing::warn!(error = %e, "enhancement task failed, delivering unenhanced image");
            current_bytes
        }
    }
}

// ---------------------------------------------------------------------------
// Pure image operations
// ---------------------------------------------------------------------------

/// Fraction of pixels whose Sobel gradient magnitude exceeds the edge
/// threshold. Smooth portraits sit well under 0.1; artifact-riddled
/// generations spike above it.
pub fn edge_density(luma: &GrayImage) -> f32 {
    let (width, height) = luma.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let px = |x: u32, y: u32| luma.get_pixel(x, y).0[0] as f32;
    let mut edges = 0usize;
    let total = ((width - 2) as usize) * ((height - 2) as usize);

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let gx = px(x + 1, y - 1) + 2.0 * px(x + 1, y) + px(x + 1, y + 1)
                - px(x - 1, y - 1)
                - 2.0 * px(x - 1, y)
                - px(x - 1, y + 1);
            let gy = px(x - 1, y + 1) + 2.0 * px(x, y + 1) + px(x + 1, y + 1)
                - px(x - 1, y - 1)
                - 2.0 * px(x, y - 1)
                - px(x + 1, y - 1);
            if (gx * gx + gy * gy).sqrt() > EDGE_MAGNITUDE_THRESHOLD {
                edges += 1;
            }
        }
    }
    edges as f32 / total as f32
}

/// Per-channel percentile contrast stretch: the 1st and 99th
/// percentiles map to 0 and 255, clipping outliers.
pub fn normalize_contrast(mut image: RgbImage) -> RgbImage {
    let pixel_count = (image.width() * image.height()) as usize;
    if pixel_count == 0 {
        return image;
    }
    let clip = ((pixel_count as f32) * CONTRAST_CLIP_PERCENT) as usize;

    for channel in 0..3 {
        let mut histogram = [0usize; 256];
        for pixel in image.pixels() {
            histogram[pixel.0[channel] as usize] += 1;
        }

        let low = percentile_bound(&histogram, clip, false);
        let high = percentile_bound(&histogram, clip, true);
        if high <= low {
            continue;
        }

        let scale = 255.0 / (high - low) as f32;
        for pixel in image.pixels_mut() {
            let v = pixel.0[channel] as f32;
            pixel.0[channel] = ((v - low as f32) * scale).clamp(0.0, 255.0) as u8;
        }
    }
    image
}

fn percentile_bound(histogram: &[usize; 256], clip: usize, from_top: bool) -> usize {
    let mut seen = 0usize;
    if from_top {
        for value in (0..256).rev() {
            seen += histogram[value];
            if seen > clip {
                return value;
            }
        }
        255
    } else {
        for (value, count) in histogram.iter().enumerate() {
            seen += count;
            if seen > clip {
                return value;
            }
        }
        0
    }
}

/// Fit the image inside the target bound, never shrinking.
pub fn upscale(image: DynamicImage, width: u32, height: u32) -> DynamicImage {
    if image.width() >= width || image.height() >= height {
        return image;
    }
    image.resize(width, height, FilterType::Lanczos3)
}

fn encode_jpeg(rgb: &RgbImage) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, OUTPUT_JPEG_QUALITY)
        .encode_image(rgb)
        .ok()?;
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn flat_image_has_no_edges() {
        let luma = GrayImage::from_pixel(64, 64, image::Luma([120]));
        assert_eq!(edge_density(&luma), 0.0);
    }

    #[test]
    fn hard_stripes_are_all_edges() {
        // Width-2 vertical stripes: every interior pixel sees opposite
        // values two columns apart.
        let luma = GrayImage::from_fn(64, 64, |x, _| {
            if (x / 2) % 2 == 0 {
                image::Luma([0])
            } else {
                image::Luma([255])
            }
        });
        assert!(edge_density(&luma) > 0.9);
    }

    #[test]
    fn tiny_images_are_edge_free() {
        let luma = GrayImage::from_pixel(2, 2, image::Luma([0]));
        assert_eq!(edge_density(&luma), 0.0);
    }

    #[test]
    fn contrast_stretch_expands_a_narrow_range() {
        let img = RgbImage::from_fn(32, 32, |x, _| {
            // Values squeezed into [100, 140].
            Rgb([100 + (x % 40) as u8; 3])
        });
        let stretched = normalize_contrast(img);
        let values: Vec<u8> = stretched.pixels().map(|p| p.0[0]).collect();
        let min = *values.iter().min().unwrap();
        let max = *values.iter().max().unwrap();
        assert!(min < 10, "low end not stretched: {min}");
        assert!(max > 245, "high end not stretched: {max}");
    }

    #[test]
    fn upscale_fits_inside_the_bound() {
        let small = DynamicImage::ImageRgb8(RgbImage::new(960, 540));
        let big = upscale(small, 3840, 2160);
        assert_eq!(big.width(), 3840);
        assert_eq!(big.height(), 2160);
    }

    #[test]
    fn upscale_never_shrinks() {
        let wide = DynamicImage::ImageRgb8(RgbImage::new(4096, 1000));
        let out = upscale(wide, 3840, 2160);
        assert_eq!(out.width(), 4096);
    }
}
