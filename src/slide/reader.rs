//! Slide trait for format-agnostic slide access.
//!
//! The miner only needs three things from a slide: its full-resolution
//! size, a downsampled overview for tissue detection, and arbitrary regions
//! at full (or reduced) resolution for patch extraction.

use async_trait::async_trait;
use image::{RgbImage, RgbaImage};

use crate::error::SlideError;

/// Interface for rendering pixels from a Whole Slide Image.
///
/// Slides are opened once and never mutated, so implementations are shared
/// across render tasks behind an `Arc`.
#[async_trait]
pub trait Slide: Send + Sync {
    /// Identifier used in logs (typically the file path).
    fn identifier(&self) -> &str;

    /// Dimensions of the full-resolution (level 0) image as `(width, height)`.
    fn dimensions(&self) -> (u32, u32);

    /// Number of pyramid levels. Level 0 is the highest resolution.
    fn level_count(&self) -> usize;

    /// Downsample factor of `level` relative to level 0.
    ///
    /// Returns `None` if level is out of range.
    fn level_downsample(&self, level: usize) -> Option<f64>;

    /// Render the whole slide so it fits inside `(max_width, max_height)`.
    ///
    /// The aspect ratio is preserved, so the result may be smaller than the
    /// requested box along one axis. Transparent areas are flattened onto
    /// white.
    async fn thumbnail(&self, max_width: u32, max_height: u32) -> Result<RgbImage, SlideError>;

    /// Render a region with its alpha channel.
    ///
    /// # Arguments
    ///
    /// * `x`, `y` - Top-left corner in level-0 coordinates
    /// * `level` - Pyramid level to render at
    /// * `size` - `(width, height)` in pixels of `level`
    ///
    /// Pixels outside the slide are fully transparent.
    async fn read_region(
        &self,
        x: u32,
        y: u32,
        level: usize,
        size: (u32, u32),
    ) -> Result<RgbaImage, SlideError>;
}
