//! Per-pixel class map in mask space.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::GrayImage;
use tracing::warn;

use crate::error::MiningError;

/// Class label for every mask pixel.
///
/// Used to annotate accepted patches and, when a class whitelist is
/// configured, to skip candidates of other classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    classes: GrayImage,
}

impl LabelMap {
    pub fn new(classes: GrayImage) -> Self {
        Self { classes }
    }

    /// Load a label image from disk, reduced to a single channel.
    pub fn load(path: &Path) -> Result<Self, MiningError> {
        let image = image::open(path).map_err(|e| MiningError::LabelMap {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Self::new(image.to_luma8()))
    }

    /// Resample to `(width, height)` with nearest-neighbour lookup so class
    /// values are never blended.
    pub fn fit_to(self, width: u32, height: u32) -> Self {
        if self.classes.dimensions() == (width, height) {
            return self;
        }

        warn!(
            "Label map is {}x{} but the mask is {}x{}; resampling",
            self.classes.width(),
            self.classes.height(),
            width,
            height
        );
        Self::new(imageops::resize(
            &self.classes,
            width,
            height,
            FilterType::Nearest,
        ))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.classes.dimensions()
    }

    /// Class at mask pixel `(x, y)`, or `None` out of bounds.
    pub fn label_at(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.classes.width() || y >= self.classes.height() {
            return None;
        }
        Some(self.classes.get_pixel(x, y)[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn halves(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Luma([1])
            } else {
                Luma([2])
            }
        })
    }

    #[test]
    fn test_label_at() {
        let map = LabelMap::new(halves(10, 4));
        assert_eq!(map.label_at(0, 0), Some(1));
        assert_eq!(map.label_at(9, 3), Some(2));
        assert_eq!(map.label_at(10, 0), None);
    }

    #[test]
    fn test_fit_to_same_size_is_identity() {
        let map = LabelMap::new(halves(10, 4));
        assert_eq!(map.clone().fit_to(10, 4), map);
    }

    #[test]
    fn test_fit_to_keeps_class_values() {
        let map = LabelMap::new(halves(100, 40)).fit_to(10, 4);
        assert_eq!(map.dimensions(), (10, 4));
        assert_eq!(map.label_at(0, 0), Some(1));
        assert_eq!(map.label_at(9, 0), Some(2));
        for y in 0..4 {
            for x in 0..10 {
                let label = map.label_at(x, y).unwrap();
                assert!(label == 1 || label == 2);
            }
        }
    }

    #[test]
    fn test_load_missing_file() {
        let result = LabelMap::load(Path::new("/definitely/not/here.png"));
        assert!(matches!(result, Err(MiningError::LabelMap { .. })));
    }
}
