//! In-memory raster slides.
//!
//! A [`RasterSlide`] holds a fully decoded level-0 image and exposes a
//! virtual pyramid with power-of-two downsamples. Regions at reduced levels
//! are resampled from level 0 on demand.

use std::sync::Arc;

use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage, RgbaImage};

use crate::error::SlideError;

use super::reader::Slide;

/// Smallest long-edge size a reduced level may have.
pub const MIN_LEVEL_DIMENSION: u32 = 256;

/// Upper bound on the number of pyramid levels.
pub const MAX_LEVELS: usize = 16;

/// A decoded raster image served as a slide.
#[derive(Debug, Clone)]
pub struct RasterSlide {
    identifier: String,
    image: Arc<RgbaImage>,
    level_count: usize,
}

impl RasterSlide {
    pub fn new(identifier: impl Into<String>, image: RgbaImage) -> Self {
        let level_count = level_count_for(image.width(), image.height());
        Self {
            identifier: identifier.into(),
            image: Arc::new(image),
            level_count,
        }
    }

    fn check_level(&self, level: usize) -> Result<u32, SlideError> {
        if level >= self.level_count {
            return Err(SlideError::InvalidLevel {
                level,
                level_count: self.level_count,
            });
        }
        Ok(1u32 << level)
    }
}

fn level_count_for(width: u32, height: u32) -> usize {
    let long_edge = width.max(height);
    let mut levels = 1;
    while levels < MAX_LEVELS && (long_edge >> levels) >= MIN_LEVEL_DIMENSION {
        levels += 1;
    }
    levels
}

#[async_trait]
impl Slide for RasterSlide {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn level_count(&self) -> usize {
        self.level_count
    }

    fn level_downsample(&self, level: usize) -> Option<f64> {
        (level < self.level_count).then(|| f64::from(1u32 << level))
    }

    async fn thumbnail(&self, max_width: u32, max_height: u32) -> Result<RgbImage, SlideError> {
        if max_width == 0 || max_height == 0 {
            return Err(SlideError::InvalidRegion {
                width: max_width,
                height: max_height,
            });
        }

        let image = Arc::clone(&self.image);
        tokio::task::spawn_blocking(move || render_thumbnail(&image, max_width, max_height))
            .await
            .map_err(|e| SlideError::Task(e.to_string()))
    }

    async fn read_region(
        &self,
        x: u32,
        y: u32,
        level: usize,
        size: (u32, u32),
    ) -> Result<RgbaImage, SlideError> {
        let downsample = self.check_level(level)?;
        let (width, height) = size;
        if width == 0 || height == 0 {
            return Err(SlideError::InvalidRegion { width, height });
        }

        let image = Arc::clone(&self.image);
        tokio::task::spawn_blocking(move || render_region(&image, x, y, downsample, width, height))
            .await
            .map_err(|e| SlideError::Task(e.to_string()))
    }
}

/// Copy the level-0 span covered by the region, pad with transparent pixels
/// where it leaves the image, and resample to the level's pixel size.
fn render_region(
    image: &RgbaImage,
    x: u32,
    y: u32,
    downsample: u32,
    width: u32,
    height: u32,
) -> RgbaImage {
    let span_w = width.saturating_mul(downsample);
    let span_h = height.saturating_mul(downsample);
    let mut region = RgbaImage::new(span_w, span_h);

    let (image_w, image_h) = image.dimensions();
    if x < image_w && y < image_h {
        let copy_w = span_w.min(image_w - x);
        let copy_h = span_h.min(image_h - y);
        let view = imageops::crop_imm(image, x, y, copy_w, copy_h).to_image();
        imageops::replace(&mut region, &view, 0, 0);
    }

    if downsample == 1 {
        region
    } else {
        imageops::resize(&region, width, height, FilterType::Triangle)
    }
}

/// Aspect-preserving thumbnail flattened onto a white background.
fn render_thumbnail(image: &RgbaImage, max_width: u32, max_height: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let (thumb_w, thumb_h) = thumbnail_size((width, height), max_width, max_height);
    flatten_thumbnail(image, thumb_w, thumb_h)
}

/// Largest size with the slide's aspect ratio that fits the box, never
/// upscaling and never collapsing an axis to zero.
pub(super) fn thumbnail_size(dimensions: (u32, u32), max_width: u32, max_height: u32) -> (u32, u32) {
    let (width, height) = dimensions;
    let downsample = (f64::from(width) / f64::from(max_width))
        .max(f64::from(height) / f64::from(max_height))
        .max(1.0);

    let thumb_w = ((f64::from(width) / downsample).round() as u32).clamp(1, max_width);
    let thumb_h = ((f64::from(height) / downsample).round() as u32).clamp(1, max_height);
    (thumb_w, thumb_h)
}

/// Resample `image` to exactly `thumb_w` x `thumb_h` and blend it onto white.
pub(super) fn flatten_thumbnail(image: &RgbaImage, thumb_w: u32, thumb_h: u32) -> RgbImage {
    let small = imageops::thumbnail(image, thumb_w, thumb_h);

    RgbImage::from_fn(thumb_w, thumb_h, |x, y| {
        let [r, g, b, a] = small.get_pixel(x, y).0;
        let alpha = u16::from(a);
        let blend = |c: u8| ((u16::from(c) * alpha + 255 * (255 - alpha)) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

// =============================================================================
// Tests
// =============================================================================
