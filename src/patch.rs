//! Patch coordinates and rendered patch buffers.

use image::RgbaImage;

/// A patch location in full-resolution slide space plus its target size.
///
/// Produced either by the mask-driven sampler or parsed verbatim from a
/// manifest in replay mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatchCoordinate {
    /// Left edge in level-0 pixels
    pub x: u32,

    /// Top edge in level-0 pixels
    pub y: u32,

    /// Patch height in pixels at `level`
    pub height: u32,

    /// Patch width in pixels at `level`
    pub width: u32,

    /// Pyramid level the patch is rendered at (0 = full resolution)
    pub level: usize,
}

impl PatchCoordinate {
    /// Create a level-0 coordinate with the given `(height, width)`.
    pub fn new(x: u32, y: u32, patch_size: (u32, u32)) -> Self {
        Self {
            x,
            y,
            height: patch_size.0,
            width: patch_size.1,
            level: 0,
        }
    }

    /// Same coordinate, rendered at a different pyramid level.
    pub fn at_level(mut self, level: usize) -> Self {
        self.level = level;
        self
    }
}

/// Metadata travelling with a rendered patch.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchMetadata {
    /// Where the patch was read from
    pub coordinate: PatchCoordinate,

    /// Class from the label map, if one was supplied
    pub label: Option<u8>,
}

/// A rendered candidate patch: RGBA pixels plus metadata.
#[derive(Debug, Clone)]
pub struct Patch {
    /// Pixels as returned by the slide, alpha included
    pub pixels: RgbaImage,

    /// Location and annotations
    pub metadata: PatchMetadata,
}

impl Patch {
    pub fn new(pixels: RgbaImage, coordinate: PatchCoordinate, label: Option<u8>) -> Self {
        Self {
            pixels,
            metadata: PatchMetadata { coordinate, label },
        }
    }

    /// Rendered `(height, width)` of the pixel buffer.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.pixels.height(), self.pixels.width())
    }

    pub fn coordinate(&self) -> &PatchCoordinate {
        &self.metadata.coordinate
    }
}
