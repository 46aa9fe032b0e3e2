//! Thumbnail tissue segmentation.
//!
//! Slide glass is bright and nearly colourless while stained tissue is
//! saturated or dark. Each pixel is split into saturation and value
//! (brightness); Otsu thresholds on both channels, bounded by fixed limits,
//! separate background from tissue. A morphological opening then removes
//! isolated specks (dust, compression noise).

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::morphology;
use serde::Deserialize;

use super::ValidityMask;

/// Saturation at or below which a pixel can be background.
pub const DEFAULT_MIN_SATURATION: u8 = 20;

/// Upper bound of the value threshold; brighter low-saturation pixels are glass.
pub const DEFAULT_MAX_BACKGROUND_VALUE: u8 = 200;

/// Radius of the opening applied to the raw mask.
pub const DEFAULT_CLEANUP_RADIUS: u8 = 1;

/// Tunable thresholds for [`tissue_mask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TissueMaskParams {
    /// Lower bound on the saturation threshold
    pub min_saturation: u8,

    /// Upper bound on the value threshold
    pub max_background_value: u8,

    /// Opening radius (L∞); 0 disables cleanup
    pub cleanup_radius: u8,
}

impl Default for TissueMaskParams {
    fn default() -> Self {
        Self {
            min_saturation: DEFAULT_MIN_SATURATION,
            max_background_value: DEFAULT_MAX_BACKGROUND_VALUE,
            cleanup_radius: DEFAULT_CLEANUP_RADIUS,
        }
    }
}

/// Build a tissue mask of the same shape as `thumbnail`.
///
/// Pure and deterministic. A thumbnail made of a single colour (a blank
/// slide) yields an all-false mask.
pub fn tissue_mask(thumbnail: &RgbImage, params: &TissueMaskParams) -> ValidityMask {
    let (width, height) = thumbnail.dimensions();
    if is_uniform(thumbnail) {
        return ValidityMask::empty(width, height);
    }

    let mut saturation = GrayImage::new(width, height);
    let mut value = GrayImage::new(width, height);
    for (x, y, pixel) in thumbnail.enumerate_pixels() {
        let (s, v) = saturation_value(pixel);
        saturation.put_pixel(x, y, Luma([s]));
        value.put_pixel(x, y, Luma([v]));
    }

    let sat_threshold = otsu_level(&saturation).max(params.min_saturation);
    let val_threshold = otsu_level(&value).min(params.max_background_value);

    let raw = GrayImage::from_fn(width, height, |x, y| {
        let s = saturation.get_pixel(x, y)[0];
        let v = value.get_pixel(x, y)[0];
        let background = s <= sat_threshold && v > val_threshold;
        if background {
            Luma([0])
        } else {
            Luma([255])
        }
    });

    let cleaned = if params.cleanup_radius > 0 {
        morphology::open(&raw, Norm::LInf, params.cleanup_radius)
    } else {
        raw
    };

    ValidityMask::from_gray(&cleaned)
}

/// HSV-style saturation and value, both scaled to 0..=255.
fn saturation_value(pixel: &Rgb<u8>) -> (u8, u8) {
    let [r, g, b] = pixel.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    if max == 0 {
        return (0, 0);
    }
    let s = (u16::from(max - min) * 255 / u16::from(max)) as u8;
    (s, max)
}

fn is_uniform(image: &RgbImage) -> bool {
    let mut pixels = image.pixels();
    match pixels.next() {
        Some(first) => pixels.all(|p| p == first),
        None => true,
    }
}

// =============================================================================
// Tests
// =============================================================================
