//! Tiled slide formats.
//!
//! Pyramidal TIFF files (Aperio SVS and generic tiled TIFF) are parsed
//! through a [`RangeReader`](crate::io::RangeReader) so only the IFDs, the
//! tile index and the tiles a region touches are ever read.

pub mod detect;
pub mod jpeg;
pub mod tiff;

pub use detect::{is_tiff_header, SlideFormat, SlideProperties};
pub use jpeg::prepare_tile_jpeg;
pub use tiff::{PyramidLevel, TiffPyramid, TileData};
