//! Pyramid level identification.
//!
//! A slide file holds several IFDs. Only tiled IFDs whose dimensions step
//! down by power-of-two factors from the largest one are pyramid levels;
//! label, macro and thumbnail images (usually stripped) are skipped.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE};
use super::tags::{Compression, TiffTag};
use super::values::ValueReader;

/// Maximum number of IFDs followed along the chain.
const MAX_IFDS: usize = 100;

/// Allowed disagreement between horizontal and vertical downsample.
const MAX_ASPECT_DRIFT: f64 = 0.1;

// =============================================================================
// PyramidLevel
// =============================================================================

/// One resolution of the image pyramid.
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    /// 0 = highest resolution
    pub level_index: usize,

    /// Position of the IFD in the file's chain
    pub ifd_index: usize,

    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,

    /// Relative to level 0
    pub downsample: f64,

    pub compression: Compression,
    pub samples_per_pixel: u16,

    pub tile_offsets_entry: Option<IfdEntry>,
    pub tile_byte_counts_entry: Option<IfdEntry>,
    pub jpeg_tables_entry: Option<IfdEntry>,
}

impl PyramidLevel {
    /// Build a level from a tiled IFD. Returns `None` for stripped images.
    fn from_ifd(ifd: &Ifd, ifd_index: usize, byte_order: ByteOrder) -> Option<Self> {
        let tile_width = ifd.tile_width(byte_order).filter(|&w| w > 0)?;
        let tile_height = ifd.tile_height(byte_order).filter(|&h| h > 0)?;
        let width = ifd.image_width(byte_order).filter(|&w| w > 0)?;
        let height = ifd.image_height(byte_order).filter(|&h| h > 0)?;

        // TIFF defaults: no compression, one sample per pixel
        let compression = Compression::from_u16(ifd.compression(byte_order).unwrap_or(1));
        let samples_per_pixel = ifd
            .get_u32(TiffTag::SamplesPerPixel, byte_order)
            .and_then(|v| u16::try_from(v).ok())
            .unwrap_or(1);

        Some(PyramidLevel {
            level_index: 0,
            ifd_index,
            width,
            height,
            tile_width,
            tile_height,
            tiles_x: width.div_ceil(tile_width),
            tiles_y: height.div_ceil(tile_height),
            downsample: 1.0,
            compression,
            samples_per_pixel,
            tile_offsets_entry: ifd.get_entry_by_tag(TiffTag::TileOffsets).cloned(),
            tile_byte_counts_entry: ifd.get_entry_by_tag(TiffTag::TileByteCounts).cloned(),
            jpeg_tables_entry: ifd.get_entry_by_tag(TiffTag::JpegTables).cloned(),
        })
    }

    pub fn has_tile_data(&self) -> bool {
        self.tile_offsets_entry.is_some() && self.tile_byte_counts_entry.is_some()
    }

    pub fn tile_count(&self) -> usize {
        self.tiles_x as usize * self.tiles_y as usize
    }

    /// Row-major index of a tile, `None` when out of range.
    pub fn tile_index(&self, tile_x: u32, tile_y: u32) -> Option<usize> {
        if tile_x >= self.tiles_x || tile_y >= self.tiles_y {
            return None;
        }
        Some(tile_y as usize * self.tiles_x as usize + tile_x as usize)
    }

    /// Pixels of a tile that lie inside the image. Edge tiles are stored
    /// padded to the full tile size but only this part is valid.
    pub fn tile_dimensions(&self, tile_x: u32, tile_y: u32) -> Option<(u32, u32)> {
        if tile_x >= self.tiles_x || tile_y >= self.tiles_y {
            return None;
        }
        let w = self.tile_width.min(self.width - tile_x * self.tile_width);
        let h = self.tile_height.min(self.height - tile_y * self.tile_height);
        Some((w, h))
    }
}

// =============================================================================
// TiffPyramid
// =============================================================================

/// Parsed pyramid structure of a tiled TIFF.
#[derive(Debug, Clone)]
pub struct TiffPyramid {
    pub header: TiffHeader,

    /// Sorted by resolution, level 0 first
    pub levels: Vec<PyramidLevel>,

    /// ImageDescription of the first IFD, if any
    pub description: Option<String>,
}

impl TiffPyramid {
    /// Parse the header and IFD chain and identify the pyramid levels.
    pub async fn parse<R: RangeReader>(reader: &R) -> Result<Self, TiffError> {
        let header_len = BIGTIFF_HEADER_SIZE.min(reader.size() as usize);
        let header_bytes = reader.read_exact_at(0, header_len).await?;
        let header = TiffHeader::parse(&header_bytes, reader.size())?;

        let ifds = Self::parse_all_ifds(reader, &header).await?;

        let description = match ifds
            .first()
            .and_then(|ifd| ifd.get_entry_by_tag(TiffTag::ImageDescription))
        {
            Some(entry) => Some(ValueReader::new(reader, &header).read_string(entry).await?),
            None => None,
        };

        Ok(Self::build_pyramid(header, &ifds, description))
    }

    async fn parse_all_ifds<R: RangeReader>(
        reader: &R,
        header: &TiffHeader,
    ) -> Result<Vec<Ifd>, TiffError> {
        let mut ifds: Vec<Ifd> = Vec::new();
        let mut offset = header.first_ifd_offset;

        while offset != 0 && ifds.len() < MAX_IFDS {
            if offset >= reader.size() {
                return Err(TiffError::InvalidIfdOffset(offset));
            }
            let count_bytes = reader.read_exact_at(offset, header.ifd_count_size()).await?;
            let entry_count = header.read_entry_count(&count_bytes)?;

            let ifd_bytes = reader
                .read_exact_at(offset, Ifd::calculate_size(entry_count.min(4096), header))
                .await?;
            let ifd = Ifd::parse(&ifd_bytes, header)?;

            offset = ifd.next_ifd_offset;
            ifds.push(ifd);
        }

        Ok(ifds)
    }

    fn build_pyramid(header: TiffHeader, ifds: &[Ifd], description: Option<String>) -> Self {
        let mut candidates: Vec<PyramidLevel> = ifds
            .iter()
            .enumerate()
            .filter_map(|(index, ifd)| PyramidLevel::from_ifd(ifd, index, header.byte_order))
            .filter(PyramidLevel::has_tile_data)
            .collect();

        // Largest area first: that is level 0
        candidates.sort_by_key(|level| {
            std::cmp::Reverse(u64::from(level.width) * u64::from(level.height))
        });

        Self {
            header,
            levels: Self::filter_pyramid_levels(candidates),
            description,
        }
    }

    /// Keep the candidates whose downsample from level 0 is a power of two
    /// and consistent along both axes.
    fn filter_pyramid_levels(candidates: Vec<PyramidLevel>) -> Vec<PyramidLevel> {
        let Some(base) = candidates.first() else {
            return candidates;
        };
        let base_width = f64::from(base.width);
        let base_height = f64::from(base.height);

        let mut levels: Vec<PyramidLevel> = Vec::new();
        for (idx, mut level) in candidates.into_iter().enumerate() {
            let downsample_x = base_width / f64::from(level.width);
            let downsample_y = base_height / f64::from(level.height);
            let downsample = (downsample_x + downsample_y) / 2.0;

            let consistent = (downsample_x / downsample_y - 1.0).abs() < MAX_ASPECT_DRIFT;
            let is_new = levels
                .last()
                .map_or(true, |previous| downsample > previous.downsample * 1.5);

            if consistent && is_new && is_valid_downsample(downsample, idx) {
                level.level_index = levels.len();
                level.downsample = if idx == 0 { 1.0 } else { downsample };
                levels.push(level);
            }
        }
        levels
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}

/// Level 0 must be ~1x; lower levels must be within 20% of a power of two
/// of at least 2.
fn is_valid_downsample(downsample: f64, level_idx: usize) -> bool {
    if level_idx == 0 {
        return (downsample - 1.0).abs() < 0.1;
    }
    let rounded = downsample.log2().round();
    if rounded < 1.0 {
        return false;
    }
    let ratio = downsample / 2.0_f64.powf(rounded);
    ratio > 0.8 && ratio < 1.2
}

// =============================================================================
// Tile Data
// =============================================================================

/// Tile locations and shared JPEG tables of one level.
#[derive(Debug, Clone)]
pub struct TileData {
    pub offsets: Vec<u64>,
    pub byte_counts: Vec<u64>,
    pub jpeg_tables: Option<Bytes>,
}

impl TileData {
    pub async fn load<R: RangeReader>(
        reader: &R,
        level: &PyramidLevel,
        header: &TiffHeader,
    ) -> Result<Self, TiffError> {
        let values = ValueReader::new(reader, header);

        let offsets_entry = level
            .tile_offsets_entry
            .as_ref()
            .ok_or(TiffError::MissingTag("TileOffsets"))?;
        let counts_entry = level
            .tile_byte_counts_entry
            .as_ref()
            .ok_or(TiffError::MissingTag("TileByteCounts"))?;

        let offsets = values.read_u64_array(offsets_entry).await?;
        let byte_counts = values.read_u64_array(counts_entry).await?;
        for (tag, found) in [("TileOffsets", offsets.len()), ("TileByteCounts", byte_counts.len())] {
            if found < level.tile_count() {
                return Err(TiffError::InvalidTagValue {
                    tag,
                    message: format!("{} entries for {} tiles", found, level.tile_count()),
                });
            }
        }

        let jpeg_tables = match level.jpeg_tables_entry {
            Some(ref entry) => Some(values.read_bytes(entry).await?),
            None => None,
        };

        Ok(Self {
            offsets,
            byte_counts,
            jpeg_tables,
        })
    }

    /// `(offset, byte_count)` of a tile.
    pub fn get_tile_location(&self, tile_index: usize) -> Option<(u64, u64)> {
        Some((
            *self.offsets.get(tile_index)?,
            *self.byte_counts.get(tile_index)?,
        ))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn level(width: u32, height: u32, tile: u32) -> PyramidLevel {
        PyramidLevel {
            level_index: 0,
            ifd_index: 0,
            width,
            height,
            tile_width: tile,
            tile_height: tile,
            tiles_x: width.div_ceil(tile),
            tiles_y: height.div_ceil(tile),
            downsample: 1.0,
            compression: Compression::Jpeg,
            samples_per_pixel: 3,
            tile_offsets_entry: None,
            tile_byte_counts_entry: None,
            jpeg_tables_entry: None,
        }
    }

    #[test]
    fn test_tile_geometry() {
        let level = level(1000, 700, 256);
        assert_eq!((level.tiles_x, level.tiles_y), (4, 3));
        assert_eq!(level.tile_count(), 12);
        assert_eq!(level.tile_index(3, 2), Some(11));
        assert_eq!(level.tile_index(4, 0), None);
        assert_eq!(level.tile_dimensions(0, 0), Some((256, 256)));
        assert_eq!(level.tile_dimensions(3, 2), Some((232, 188)));
        assert_eq!(level.tile_dimensions(0, 3), None);
    }

    #[test]
    fn test_valid_downsample() {
        assert!(is_valid_downsample(1.0, 0));
        assert!(!is_valid_downsample(2.0, 0));
        assert!(is_valid_downsample(4.0, 1));
        assert!(is_valid_downsample(4.02, 2));
        assert!(!is_valid_downsample(1.0, 1));
        assert!(!is_valid_downsample(3.0, 1));
    }

    #[test]
    fn test_filter_levels() {
        let candidates = vec![
            level(4000, 3000, 256),
            level(1000, 750, 256),
            // Macro-like image with the wrong aspect ratio
            level(1000, 300, 256),
            level(250, 187, 256),
            // Oddly scaled
            level(1300, 975, 256),
        ];
        let mut sorted = candidates;
        sorted.sort_by_key(|l| std::cmp::Reverse(u64::from(l.width) * u64::from(l.height)));

        let levels = TiffPyramid::filter_pyramid_levels(sorted);
        let dims: Vec<(u32, u32)> = levels.iter().map(|l| (l.width, l.height)).collect();
        assert_eq!(dims, vec![(4000, 3000), (1000, 750), (250, 187)]);
        assert_eq!(levels[1].level_index, 1);
        assert!((levels[1].downsample - 4.0).abs() < 1e-9);
        assert!((levels[2].downsample - 16.0).abs() < 0.1);
    }
}
