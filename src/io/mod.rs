//! Byte-range access to slide files.
//!
//! Tiled slides are never read whole: the TIFF parser and the tile decoder
//! ask for exactly the byte ranges they need through [`RangeReader`].

mod local_reader;
mod range_reader;

pub use local_reader::LocalFileReader;
pub use range_reader::RangeReader;
