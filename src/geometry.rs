//! Mapping between thumbnail (mask) space and full-resolution slide space.
//!
//! The validity mask is built from a thumbnail whose size is derived by
//! integer division of the slide dimensions. Integer division can make the
//! thumbnail smaller than `W / scale` exactly, so the factor used to map mask
//! pixels back to the slide is always recomputed from the *realized*
//! thumbnail dimensions.
//!
//! # Rounding rules
//!
//! - Thumbnail size: `floor(W / scale)`, `floor(H / scale)`.
//! - Mask → slide: `floor(mx * sx)`, `floor(my * sy)` (top-left corner of the
//!   mask pixel).
//! - Slide → mask: `floor(x / sx)`, `floor(y / sy)`, clamped to the mask.
//! - Slide extents → mask extents: `ceil(len / s)`, at least one pixel.

use crate::error::GeometryError;

/// Per-axis ratio between full-resolution and mask-space coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactor {
    /// Horizontal factor, `W / thumbnail_width`
    pub sx: f64,

    /// Vertical factor, `H / thumbnail_height`
    pub sy: f64,
}

impl ScaleFactor {
    /// Compute the realized factor from slide and thumbnail dimensions.
    ///
    /// Fails with [`GeometryError::DegenerateThumbnail`] when either thumbnail
    /// dimension is zero.
    pub fn from_dimensions(
        slide: (u32, u32),
        thumbnail: (u32, u32),
    ) -> Result<Self, GeometryError> {
        let (width, height) = slide;
        let (thumb_w, thumb_h) = thumbnail;
        if thumb_w == 0 || thumb_h == 0 {
            return Err(GeometryError::DegenerateThumbnail {
                width,
                height,
                thumb_w,
                thumb_h,
            });
        }

        Ok(Self {
            sx: width as f64 / thumb_w as f64,
            sy: height as f64 / thumb_h as f64,
        })
    }

    /// Map a mask pixel to the slide-space coordinate of its top-left corner.
    pub fn to_slide(&self, mask_x: u32, mask_y: u32) -> (u32, u32) {
        (
            (mask_x as f64 * self.sx).floor() as u32,
            (mask_y as f64 * self.sy).floor() as u32,
        )
    }

    /// Map a slide-space coordinate to the mask pixel containing it.
    ///
    /// The result is clamped to `mask_dims` so points on the far slide edge
    /// land on the last mask pixel.
    pub fn to_mask(&self, x: u32, y: u32, mask_dims: (u32, u32)) -> (u32, u32) {
        let mx = (x as f64 / self.sx).floor() as u32;
        let my = (y as f64 / self.sy).floor() as u32;
        (
            mx.min(mask_dims.0.saturating_sub(1)),
            my.min(mask_dims.1.saturating_sub(1)),
        )
    }

    /// Convert a slide-space extent `(w, h)` to a mask-space extent.
    pub fn extent_to_mask(&self, width: f64, height: f64) -> (u32, u32) {
        let w = (width / self.sx).ceil().max(1.0) as u32;
        let h = (height / self.sy).ceil().max(1.0) as u32;
        (w, h)
    }
}

/// Target thumbnail size for a slide of `(width, height)` at `scale`.
///
/// Fails when `scale <= 0` or when the slide is smaller than `scale` along
/// either axis.
pub fn thumbnail_dimensions(
    width: u32,
    height: u32,
    scale: i64,
) -> Result<(u32, u32), GeometryError> {
    let invalid = GeometryError::InvalidScale {
        scale,
        width,
        height,
    };
    if scale <= 0 {
        return Err(invalid);
    }

    let scale = scale as u64;
    let thumb_w = u64::from(width) / scale;
    let thumb_h = u64::from(height) / scale;
    if thumb_w == 0 || thumb_h == 0 {
        return Err(invalid);
    }

    // Both are <= the original u32 dimensions.
    Ok((thumb_w as u32, thumb_h as u32))
}

// =============================================================================
// Tests
// =============================================================================
