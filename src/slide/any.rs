//! Format-dispatching slide.

use async_trait::async_trait;
use image::{RgbImage, RgbaImage};

use crate::error::SlideError;

use super::raster::RasterSlide;
use super::reader::Slide;
use super::tiled::TiffSlide;

/// A slide opened by [`AutoSlideSource`](super::AutoSlideSource).
///
/// An enum rather than a trait object so the source keeps a concrete
/// associated `Slide` type.
pub enum AnySlide {
    /// Fully decoded raster image
    Raster(RasterSlide),
    /// Tiled pyramid read on demand
    Tiled(TiffSlide),
}

impl AnySlide {
    /// Short name of the backend, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AnySlide::Raster(_) => "raster",
            AnySlide::Tiled(slide) => slide.format().name(),
        }
    }
}

#[async_trait]
impl Slide for AnySlide {
    fn identifier(&self) -> &str {
        match self {
            AnySlide::Raster(s) => s.identifier(),
            AnySlide::Tiled(s) => s.identifier(),
        }
    }

    fn dimensions(&self) -> (u32, u32) {
        match self {
            AnySlide::Raster(s) => s.dimensions(),
            AnySlide::Tiled(s) => s.dimensions(),
        }
    }

    fn level_count(&self) -> usize {
        match self {
            AnySlide::Raster(s) => s.level_count(),
            AnySlide::Tiled(s) => s.level_count(),
        }
    }

    fn level_downsample(&self, level: usize) -> Option<f64> {
        match self {
            AnySlide::Raster(s) => s.level_downsample(level),
            AnySlide::Tiled(s) => s.level_downsample(level),
        }
    }

    async fn thumbnail(&self, max_width: u32, max_height: u32) -> Result<RgbImage, SlideError> {
        match self {
            AnySlide::Raster(s) => s.thumbnail(max_width, max_height).await,
            AnySlide::Tiled(s) => s.thumbnail(max_width, max_height).await,
        }
    }

    async fn read_region(
        &self,
        x: u32,
        y: u32,
        level: usize,
        size: (u32, u32),
    ) -> Result<RgbaImage, SlideError> {
        match self {
            AnySlide::Raster(s) => s.read_region(x, y, level, size).await,
            AnySlide::Tiled(s) => s.read_region(x, y, level, size).await,
        }
    }
}
