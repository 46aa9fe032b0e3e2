//! Pyramidal TIFF slides read tile by tile.
//!
//! A [`TiffSlide`] parses the pyramid once at open time (IFD chain, tile
//! offsets, JPEG tables) and afterwards reads only the tiles a request
//! touches. Thumbnails come from the smallest level that still covers the
//! requested size, so neither operation decodes a full level 0.
//!
//! ```text
//! read_region(x, y, level, (w, h))
//!   │  level-0 origin ÷ downsample
//!   ▼
//! ┌──────┬──────┬──────┐
//! │ tile │ tile │ tile │   only tiles intersecting the region are
//! ├──────┼──────┼──────┤   fetched (RangeReader), decoded and cached
//! │ tile │▓▓▓▓▓▓│▓▓    │
//! └──────┴──────┴──────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use image::imageops;
use image::{ImageFormat, RgbImage, RgbaImage};
use tracing::debug;

use crate::error::{SlideError, TiffError};
use crate::format::tiff::{Compression, PyramidLevel, TiffPyramid, TileData};
use crate::format::{prepare_tile_jpeg, SlideFormat, SlideProperties};
use crate::io::{LocalFileReader, RangeReader};

use super::cache::{TileCache, TileKey};
use super::raster::{flatten_thumbnail, thumbnail_size};
use super::reader::Slide;

/// A pyramid level together with its tile index.
struct TiledLevel {
    level: PyramidLevel,
    tiles: TileData,
}

/// A tiled, multi-resolution TIFF (Aperio SVS or generic pyramidal TIFF).
pub struct TiffSlide<R: RangeReader = LocalFileReader> {
    identifier: String,
    reader: R,
    format: SlideFormat,
    properties: SlideProperties,
    levels: Vec<TiledLevel>,
    cache: TileCache,
}

impl<R: RangeReader> TiffSlide<R> {
    /// Parse the pyramid behind `reader` with a default-sized tile cache.
    pub async fn open(reader: R) -> Result<Self, SlideError> {
        Self::open_with_cache(reader, TileCache::default()).await
    }

    pub async fn open_with_cache(reader: R, cache: TileCache) -> Result<Self, SlideError> {
        let identifier = reader.identifier().to_string();
        let tiff_error = |source: TiffError| SlideError::Tiff {
            path: identifier.clone(),
            source,
        };

        let pyramid = TiffPyramid::parse(&reader).await.map_err(tiff_error)?;
        if pyramid.levels.is_empty() {
            return Err(tiff_error(TiffError::NotTiled));
        }

        let mut levels = Vec::with_capacity(pyramid.level_count());
        for level in &pyramid.levels {
            if !level.compression.is_supported() {
                return Err(tiff_error(TiffError::UnsupportedCompression(
                    level.compression.name(),
                )));
            }
            let tiles = TileData::load(&reader, level, &pyramid.header)
                .await
                .map_err(tiff_error)?;
            levels.push(TiledLevel {
                level: level.clone(),
                tiles,
            });
        }

        let description = pyramid.description.as_deref();
        let format = SlideFormat::from_description(description);
        let properties = description.map(SlideProperties::parse).unwrap_or_default();

        for tiled in &levels {
            let level = &tiled.level;
            debug!(
                "{}: level {} (IFD {}) {}x{}, {}x{} tiles, downsample {:.2}, {}",
                identifier,
                level.level_index,
                level.ifd_index,
                level.width,
                level.height,
                level.tile_width,
                level.tile_height,
                level.downsample,
                level.compression.name()
            );
        }

        Ok(Self {
            identifier,
            reader,
            format,
            properties,
            levels,
            cache,
        })
    }

    pub fn format(&self) -> SlideFormat {
        self.format
    }

    pub fn properties(&self) -> &SlideProperties {
        &self.properties
    }

    /// `(width, height)` of `level`.
    pub fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        self.levels
            .get(level)
            .map(|l| (l.level.width, l.level.height))
    }

    /// Number of decoded tiles currently cached.
    pub async fn cached_tiles(&self) -> usize {
        self.cache.len().await
    }

    fn check_level(&self, level: usize) -> Result<&TiledLevel, SlideError> {
        self.levels.get(level).ok_or(SlideError::InvalidLevel {
            level,
            level_count: self.levels.len(),
        })
    }

    /// Decoded tile, from the cache when possible.
    async fn tile(
        &self,
        level: usize,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<Arc<RgbaImage>, SlideError> {
        let tiled = self.check_level(level)?;
        let pyramid_level = &tiled.level;
        let decode_error = |message: String| SlideError::Decode {
            path: self.identifier.clone(),
            message,
        };

        let index = pyramid_level
            .tile_index(tile_x, tile_y)
            .ok_or_else(|| decode_error(format!("tile ({}, {}) out of range", tile_x, tile_y)))?;
        let key = TileKey { level, index };
        if let Some(tile) = self.cache.get(&key).await {
            return Ok(tile);
        }

        let (offset, byte_count) = tiled
            .tiles
            .get_tile_location(index)
            .ok_or_else(|| decode_error(format!("no location for tile {}", index)))?;
        let (tile_w, tile_h) = (pyramid_level.tile_width, pyramid_level.tile_height);

        let tile = if byte_count == 0 {
            // Sparse files leave unscanned tiles empty.
            RgbaImage::new(tile_w, tile_h)
        } else {
            let len = usize::try_from(byte_count)
                .map_err(|_| decode_error(format!("tile {} is too large", index)))?;
            let raw = self
                .reader
                .read_exact_at(offset, len)
                .await
                .map_err(|e| SlideError::Tiff {
                    path: self.identifier.clone(),
                    source: e.into(),
                })?;

            let compression = pyramid_level.compression;
            let samples = pyramid_level.samples_per_pixel;
            let tables = tiled.tiles.jpeg_tables.clone();
            tokio::task::spawn_blocking(move || {
                decode_tile(raw, compression, tables, samples, tile_w, tile_h)
            })
            .await
            .map_err(|e| SlideError::Task(e.to_string()))?
            .map_err(decode_error)?
        };

        let tile = Arc::new(tile);
        self.cache.put(key, Arc::clone(&tile)).await;
        Ok(tile)
    }

    /// Compose `width` x `height` pixels of `level` starting at level
    /// coordinates `(left, top)`. Pixels past the level edge stay
    /// transparent.
    async fn read_level_region(
        &self,
        level: usize,
        left: u64,
        top: u64,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage, SlideError> {
        let pyramid_level = &self.check_level(level)?.level;
        let mut region = RgbaImage::new(width, height);

        let right = (left + u64::from(width)).min(u64::from(pyramid_level.width));
        let bottom = (top + u64::from(height)).min(u64::from(pyramid_level.height));
        if left >= right || top >= bottom {
            return Ok(region);
        }

        let tile_w = u64::from(pyramid_level.tile_width);
        let tile_h = u64::from(pyramid_level.tile_height);
        for ty in (top / tile_h)..=((bottom - 1) / tile_h) {
            for tx in (left / tile_w)..=((right - 1) / tile_w) {
                let (tile_x, tile_y) = (tx as u32, ty as u32);
                let tile = self.tile(level, tile_x, tile_y).await?;

                let (valid_w, valid_h) = pyramid_level
                    .tile_dimensions(tile_x, tile_y)
                    .unwrap_or((0, 0));
                let view = imageops::crop_imm(
                    tile.as_ref(),
                    0,
                    0,
                    valid_w.min(tile.width()),
                    valid_h.min(tile.height()),
                );
                let dx = (tx * tile_w) as i64 - left as i64;
                let dy = (ty * tile_h) as i64 - top as i64;
                imageops::replace(&mut region, &*view, dx, dy);
            }
        }
        Ok(region)
    }

    /// Lowest-resolution level that is still at least `width` x `height`.
    fn level_for_thumbnail(&self, width: u32, height: u32) -> usize {
        self.levels
            .iter()
            .rposition(|l| l.level.width >= width && l.level.height >= height)
            .unwrap_or(0)
    }
}

/// Decode one stored tile into RGBA.
fn decode_tile(
    raw: Bytes,
    compression: Compression,
    tables: Option<Bytes>,
    samples: u16,
    tile_w: u32,
    tile_h: u32,
) -> Result<RgbaImage, String> {
    match compression {
        Compression::Jpeg => {
            let stream = prepare_tile_jpeg(tables.as_deref(), raw);
            image::load_from_memory_with_format(&stream, ImageFormat::Jpeg)
                .map(|image| image.to_rgba8())
                .map_err(|e| e.to_string())
        }
        Compression::None => raw_tile(&raw, samples, tile_w, tile_h),
        other => Err(format!("unsupported tile compression {}", other.name())),
    }
}

/// Interleaved 8-bit samples: gray, RGB or RGBA.
fn raw_tile(raw: &[u8], samples: u16, tile_w: u32, tile_h: u32) -> Result<RgbaImage, String> {
    let needed = tile_w as usize * tile_h as usize * samples as usize;
    let raw = raw
        .get(..needed)
        .ok_or_else(|| format!("tile has {} bytes, expected {}", raw.len(), needed))?;

    let rgba: Vec<u8> = match samples {
        1 => raw.iter().flat_map(|&v| [v, v, v, 255]).collect(),
        3 => raw
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        4 => raw.to_vec(),
        n => return Err(format!("unsupported samples per pixel {}", n)),
    };
    RgbaImage::from_raw(tile_w, tile_h, rgba).ok_or_else(|| "tile buffer size mismatch".to_string())
}

#[async_trait]
impl<R: RangeReader> Slide for TiffSlide<R> {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn dimensions(&self) -> (u32, u32) {
        self.level_dimensions(0).unwrap_or((0, 0))
    }

    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn level_downsample(&self, level: usize) -> Option<f64> {
        self.levels.get(level).map(|l| l.level.downsample)
    }

    async fn thumbnail(&self, max_width: u32, max_height: u32) -> Result<RgbImage, SlideError> {
        if max_width == 0 || max_height == 0 {
            return Err(SlideError::InvalidRegion {
                width: max_width,
                height: max_height,
            });
        }

        let (thumb_w, thumb_h) = thumbnail_size(self.dimensions(), max_width, max_height);
        let level = self.level_for_thumbnail(thumb_w, thumb_h);
        let (level_w, level_h) = self.level_dimensions(level).unwrap_or((thumb_w, thumb_h));
        debug!(
            "{}: thumbnail {}x{} from level {} ({}x{})",
            self.identifier, thumb_w, thumb_h, level, level_w, level_h
        );

        let image = self.read_level_region(level, 0, 0, level_w, level_h).await?;
        tokio::task::spawn_blocking(move || flatten_thumbnail(&image, thumb_w, thumb_h))
            .await
            .map_err(|e| SlideError::Task(e.to_string()))
    }

    async fn read_region(
        &self,
        x: u32,
        y: u32,
        level: usize,
        size: (u32, u32),
    ) -> Result<RgbaImage, SlideError> {
        let downsample = self.check_level(level)?.level.downsample;
        let (width, height) = size;
        if width == 0 || height == 0 {
            return Err(SlideError::InvalidRegion { width, height });
        }

        let left = (f64::from(x) / downsample).floor() as u64;
        let top = (f64::from(y) / downsample).floor() as u64;
        self.read_level_region(level, left, top, width, height).await
    }
}

// =============================================================================
// Tests
// =============================================================================
