//! Candidate ordering and overlap bookkeeping in mask space.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::mask::ValidityMask;

/// Order in which valid mask pixels are tried as patch origins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadType {
    /// Shuffled; reproducible when a seed is configured
    #[default]
    Random,

    /// Raster order, left to right and top to bottom
    Sequential,
}

/// Valid mask pixels in the order they should be tried.
pub fn candidate_order(
    mask: &ValidityMask,
    read_type: ReadType,
    seed: Option<u64>,
) -> Vec<(u32, u32)> {
    let mut candidates: Vec<(u32, u32)> = mask.valid_pixels().collect();
    if read_type == ReadType::Random {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        candidates.shuffle(&mut rng);
    }
    candidates
}

/// Rectangle covered by a patch, in mask pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footprint {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Footprint {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Mask-space grid of pixels already covered by accepted patches.
#[derive(Debug, Clone)]
pub struct ClaimGrid {
    width: u32,
    height: u32,
    claimed: Vec<bool>,
}

impl ClaimGrid {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            claimed: vec![false; width as usize * height as usize],
        }
    }

    /// Whether no pixel of `footprint` (clipped to the grid) is claimed.
    pub fn is_free(&self, footprint: &Footprint) -> bool {
        self.cells(footprint).all(|i| !self.claimed[i])
    }

    /// Mark every pixel of `footprint` as claimed.
    pub fn claim(&mut self, footprint: &Footprint) {
        let cells: Vec<usize> = self.cells(footprint).collect();
        for i in cells {
            self.claimed[i] = true;
        }
    }

    fn cells(&self, footprint: &Footprint) -> impl Iterator<Item = usize> + '_ {
        let x_end = footprint.x.saturating_add(footprint.width).min(self.width);
        let y_end = footprint.y.saturating_add(footprint.height).min(self.height);
        let x_start = footprint.x.min(x_end);
        let width = self.width as usize;
        (footprint.y.min(y_end)..y_end).flat_map(move |y| {
            (x_start..x_end).map(move |x| y as usize * width + x as usize)
        })
    }
}
