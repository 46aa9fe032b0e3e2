//! Slide abstraction layer.
//!
//! This module provides the slide-access collaborator the miner renders
//! thumbnails and patches from.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Driver / PatchSelector         │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            SlideSource Trait            │
//! │   (opens a slide from a local path)     │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │               Slide Trait               │
//! │  (dimensions, thumbnail, read_region)   │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌────────────────────┐ ┌──────────────────┐
//! │    RasterSlide     │ │    TiffSlide     │
//! │ (PNG/JPEG/TIFF     │ │ (SVS and tiled   │
//! │  decoded whole)    │ │  pyramids, tiles │
//! │                    │ │  read on demand) │
//! └────────────────────┘ └──────────────────┘
//! ```
//!
//! [`AutoSlideSource`] sniffs the file header and returns an [`AnySlide`]
//! wrapping whichever backend fits.
//!
//! # Usage
//!
//! ```ignore
//! use patch_miner::slide::{AutoSlideSource, Slide, SlideOptions, SlideSource};
//!
//! let source = AutoSlideSource::new();
//! let slide = source.open(Path::new("slide.tiff"), &SlideOptions::default()).await?;
//!
//! let (width, height) = slide.dimensions();
//! let thumbnail = slide.thumbnail(width / 16, height / 16).await?;
//! let patch = slide.read_region(1024, 2048, 0, (256, 256)).await?;
//! ```

mod any;
mod cache;
mod raster;
mod reader;
mod source;
#[cfg(test)]
pub(crate) mod test_tiff;
mod tiled;

pub use any::AnySlide;
pub use cache::{TileCache, DEFAULT_TILE_CACHE_ENTRIES};
pub use raster::{RasterSlide, MAX_LEVELS, MIN_LEVEL_DIMENSION};
pub use reader::Slide;
pub use source::{AutoSlideSource, LocalSlideSource, SlideOptions, SlideSource, TiffSlideSource};
pub use tiled::TiffSlide;
