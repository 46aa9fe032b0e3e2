//! Tissue validity mask and auxiliary label map.
//!
//! Both live in thumbnail (mask) space. The [`ValidityMask`] marks pixels
//! that likely contain tissue; the optional [`LabelMap`] assigns a class to
//! each mask pixel. Both are immutable once built and shared read-only by the
//! patch selector.

mod label;
mod tissue;

pub use label::LabelMap;
pub use tissue::{
    tissue_mask, TissueMaskParams, DEFAULT_CLEANUP_RADIUS, DEFAULT_MAX_BACKGROUND_VALUE,
    DEFAULT_MIN_SATURATION,
};

use image::{GrayImage, Luma};

/// Boolean tissue/no-tissue classification over thumbnail pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidityMask {
    width: u32,
    height: u32,
    cells: Vec<bool>,
}

impl ValidityMask {
    /// A mask with no valid pixels.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cells: vec![false; width as usize * height as usize],
        }
    }

    /// Build a mask by evaluating `f(x, y)` for every pixel.
    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Self
    where
        F: FnMut(u32, u32) -> bool,
    {
        let mut cells = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                cells.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            cells,
        }
    }

    /// Non-zero pixels of a binary image are valid.
    pub fn from_gray(image: &GrayImage) -> Self {
        Self::from_fn(image.width(), image.height(), |x, y| {
            image.get_pixel(x, y)[0] > 0
        })
    }

    /// Render as a binary image (255 = tissue).
    pub fn to_gray(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            if self.get(x, y) {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Whether `(x, y)` is tissue. Out-of-bounds pixels are never valid.
    pub fn get(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.cells[y as usize * self.width as usize + x as usize]
    }

    /// Number of valid pixels.
    pub fn count_valid(&self) -> usize {
        self.cells.iter().filter(|&&valid| valid).count()
    }

    /// Valid pixel coordinates in raster order.
    pub fn valid_pixels(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let width = self.width as usize;
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, &valid)| valid)
            .map(move |(i, _)| ((i % width) as u32, (i / width) as u32))
    }
}
