//! Test utilities for integration tests.
//!
//! This module provides a tracking slide wrapper and helpers for writing
//! fixture slides, configuration documents and manifests to a temp dir.

use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbImage, RgbaImage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use patch_miner::error::SlideError;
use patch_miner::slide::{LocalSlideSource, RasterSlide, Slide, SlideOptions, SlideSource};

pub const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const TISSUE: Rgba<u8> = Rgba([220, 140, 190, 255]);

// =============================================================================
// Tracking Slide
// =============================================================================

/// Shared call counters for a [`TrackingSlide`] and its source.
#[derive(Debug, Default)]
pub struct CallCounts {
    pub opens: AtomicUsize,
    pub thumbnails: AtomicUsize,
    pub regions: AtomicUsize,
    pub fail_regions: AtomicBool,
}

impl CallCounts {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn thumbnails(&self) -> usize {
        self.thumbnails.load(Ordering::SeqCst)
    }

    pub fn regions(&self) -> usize {
        self.regions.load(Ordering::SeqCst)
    }
}

/// A slide that counts calls and can be told to fail every region read.
pub struct TrackingSlide {
    inner: RasterSlide,
    counts: Arc<CallCounts>,
}

#[async_trait]
impl Slide for TrackingSlide {
    fn identifier(&self) -> &str {
        self.inner.identifier()
    }

    fn dimensions(&self) -> (u32, u32) {
        self.inner.dimensions()
    }

    fn level_count(&self) -> usize {
        self.inner.level_count()
    }

    fn level_downsample(&self, level: usize) -> Option<f64> {
        self.inner.level_downsample(level)
    }

    async fn thumbnail(&self, max_width: u32, max_height: u32) -> Result<RgbImage, SlideError> {
        self.counts.thumbnails.fetch_add(1, Ordering::SeqCst);
        self.inner.thumbnail(max_width, max_height).await
    }

    async fn read_region(
        &self,
        x: u32,
        y: u32,
        level: usize,
        size: (u32, u32),
    ) -> Result<RgbaImage, SlideError> {
        self.counts.regions.fetch_add(1, Ordering::SeqCst);
        if self.counts.fail_regions.load(Ordering::SeqCst) {
            return Err(SlideError::Decode {
                path: self.identifier().to_string(),
                message: "simulated read failure".to_string(),
            });
        }
        self.inner.read_region(x, y, level, size).await
    }
}

/// Opens slides through [`LocalSlideSource`] and wraps them for tracking.
#[derive(Default)]
pub struct TrackingSlideSource {
    inner: LocalSlideSource,
    pub counts: Arc<CallCounts>,
}

impl TrackingSlideSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_regions() -> Self {
        let source = Self::default();
        source.counts.fail_regions.store(true, Ordering::SeqCst);
        source
    }
}

#[async_trait]
impl SlideSource for TrackingSlideSource {
    type Slide = TrackingSlide;

    async fn open(&self, path: &Path, options: &SlideOptions) -> Result<TrackingSlide, SlideError> {
        self.counts.opens.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.open(path, options).await?;
        Ok(TrackingSlide {
            inner,
            counts: Arc::clone(&self.counts),
        })
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// A white slide with a stained disc in the middle.
pub fn tissue_image(width: u32, height: u32) -> RgbaImage {
    let (cx, cy) = (width as f64 / 2.0, height as f64 / 2.0);
    let radius = width.min(height) as f64 * 0.35;
    RgbaImage::from_fn(width, height, |x, y| {
        let (dx, dy) = (x as f64 - cx, y as f64 - cy);
        if (dx * dx + dy * dy).sqrt() <= radius {
            TISSUE
        } else {
            BACKGROUND
        }
    })
}

/// Save `image` as a PNG slide under `dir`.
pub fn write_slide(dir: &Path, name: &str, image: &RgbaImage) -> PathBuf {
    let path = dir.join(name);
    image.save(&path).unwrap();
    path
}

/// Save `image` as an uncompressed tiled TIFF pyramid under `dir`, one
/// level per entry of `downsamples`.
pub fn write_tiled_slide(
    dir: &Path,
    name: &str,
    image: &RgbaImage,
    downsamples: &[u32],
    tile: u32,
) -> PathBuf {
    let base = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let mut file = vec![0x49, 0x49, 0x2A, 0x00, 0, 0, 0, 0];
    let mut ifds = Vec::new();

    for &downsample in downsamples {
        let (w, h) = (base.width() / downsample, base.height() / downsample);
        let level = imageops::resize(&base, w, h, FilterType::Nearest);

        let mut offsets = Vec::new();
        for ty in 0..h.div_ceil(tile) {
            for tx in 0..w.div_ceil(tile) {
                let mut block = RgbImage::new(tile, tile);
                let (x, y) = (tx * tile, ty * tile);
                let view = imageops::crop_imm(&level, x, y, tile.min(w - x), tile.min(h - y));
                imageops::replace(&mut block, &view.to_image(), 0, 0);
                offsets.push(file.len() as u32);
                file.extend_from_slice(block.as_raw());
            }
        }
        let tile_bytes = tile * tile * 3;

        let offsets_at = file.len() as u32;
        for offset in &offsets {
            file.extend_from_slice(&offset.to_le_bytes());
        }
        let counts_at = file.len() as u32;
        for _ in &offsets {
            file.extend_from_slice(&tile_bytes.to_le_bytes());
        }

        let n = offsets.len() as u32;
        ifds.push([
            (256u16, 4u16, 1u32, w),
            (257, 4, 1, h),
            (259, 3, 1, 1),
            (277, 3, 1, 3),
            (322, 3, 1, tile),
            (323, 3, 1, tile),
            (324, 4, n, offsets_at),
            (325, 4, n, counts_at),
        ]);
    }

    let mut pointer_at = 4;
    for entries in ifds {
        let at = file.len() as u32;
        file[pointer_at..pointer_at + 4].copy_from_slice(&at.to_le_bytes());
        file.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        for (tag, field_type, count, value) in entries {
            file.extend_from_slice(&tag.to_le_bytes());
            file.extend_from_slice(&field_type.to_le_bytes());
            file.extend_from_slice(&count.to_le_bytes());
            if field_type == 3 {
                file.extend_from_slice(&(value as u16).to_le_bytes());
                file.extend_from_slice(&[0, 0]);
            } else {
                file.extend_from_slice(&value.to_le_bytes());
            }
        }
        pointer_at = file.len();
        file.extend_from_slice(&[0; 4]);
    }

    let path = dir.join(name);
    std::fs::write(&path, file).unwrap();
    path
}

/// Write a JSON configuration document.
pub fn write_config(dir: &Path, body: serde_json::Value) -> PathBuf {
    let path = dir.join("config.json");
    std::fs::write(&path, serde_json::to_string_pretty(&body).unwrap()).unwrap();
    path
}

/// Coordinates listed in a manifest, in file order.
pub fn manifest_coordinates(path: &Path) -> Vec<(u32, u32)> {
    patch_miner::selector::read_manifest(path, (0, 0), 0)
        .unwrap()
        .iter()
        .map(|row| (row.coordinate.x, row.coordinate.y))
        .collect()
}

/// Number of files in `dir` with the given extension.
pub fn count_files(dir: &Path, extension: &str) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|e| e.to_str()) == Some(extension))
        .count()
}
