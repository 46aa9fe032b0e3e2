//! Opening slides from storage.

use std::path::Path;

use async_trait::async_trait;
use image::ImageReader;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::error::{SlideError, TiffError};
use crate::format::is_tiff_header;
use crate::format::tiff::TIFF_HEADER_SIZE;
use crate::io::LocalFileReader;

use super::any::AnySlide;
use super::cache::{TileCache, DEFAULT_TILE_CACHE_ENTRIES};
use super::raster::RasterSlide;
use super::reader::Slide;
use super::tiled::TiffSlide;

/// Options passed to a [`SlideSource`] when opening a slide.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlideOptions {
    /// Decode images of any size instead of enforcing the decoder's default
    /// memory limits.
    pub allow_large_images: bool,
}

/// Trait for opening slides from a path.
///
/// This abstraction lets the driver work with different slide backends
/// without being tied to a specific decoder.
#[async_trait]
pub trait SlideSource: Send + Sync {
    /// The type of slide this source opens.
    type Slide: Slide + 'static;

    /// Open the slide at `path`.
    async fn open(&self, path: &Path, options: &SlideOptions) -> Result<Self::Slide, SlideError>;
}

/// Opens raster images from the local filesystem as [`RasterSlide`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSlideSource;

impl LocalSlideSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SlideSource for LocalSlideSource {
    type Slide = RasterSlide;

    async fn open(&self, path: &Path, options: &SlideOptions) -> Result<RasterSlide, SlideError> {
        let identifier = path.display().to_string();
        if !path.exists() {
            return Err(SlideError::NotFound(identifier));
        }

        let path = path.to_path_buf();
        let options = *options;
        tokio::task::spawn_blocking(move || decode_slide(&path, &options))
            .await
            .map_err(|e| SlideError::Task(e.to_string()))?
    }
}

/// Opens tiled pyramidal TIFFs (Aperio SVS, generic tiled TIFF) as
/// [`TiffSlide`]s that read tiles on demand.
#[derive(Debug, Clone, Copy)]
pub struct TiffSlideSource {
    cache_tiles: usize,
}

impl TiffSlideSource {
    pub fn new() -> Self {
        Self {
            cache_tiles: DEFAULT_TILE_CACHE_ENTRIES,
        }
    }

    /// Keep at most `tiles` decoded tiles per opened slide.
    pub fn with_cache_tiles(mut self, tiles: usize) -> Self {
        self.cache_tiles = tiles;
        self
    }
}

impl Default for TiffSlideSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SlideSource for TiffSlideSource {
    type Slide = TiffSlide;

    async fn open(&self, path: &Path, _options: &SlideOptions) -> Result<TiffSlide, SlideError> {
        let identifier = path.display().to_string();
        if !path.exists() {
            return Err(SlideError::NotFound(identifier));
        }

        let reader = LocalFileReader::open(path)
            .await
            .map_err(|e| SlideError::Open {
                path: identifier.clone(),
                message: e.to_string(),
            })?;
        let slide = TiffSlide::open_with_cache(reader, TileCache::new(self.cache_tiles)).await?;

        let (width, height) = slide.dimensions();
        debug!(
            "Opened {} as {} ({}x{}, {} levels)",
            identifier,
            slide.format().name(),
            width,
            height,
            slide.level_count()
        );
        Ok(slide)
    }
}

/// Chooses the backend from the file's contents: tiled TIFF pyramids are
/// read tile by tile, everything else is decoded whole.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoSlideSource {
    raster: LocalSlideSource,
    tiled: TiffSlideSource,
}

impl AutoSlideSource {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SlideSource for AutoSlideSource {
    type Slide = AnySlide;

    async fn open(&self, path: &Path, options: &SlideOptions) -> Result<AnySlide, SlideError> {
        let identifier = path.display().to_string();
        if !path.exists() {
            return Err(SlideError::NotFound(identifier));
        }

        if has_tiff_header(path).await? {
            match self.tiled.open(path, options).await {
                Ok(slide) => return Ok(AnySlide::Tiled(slide)),
                Err(SlideError::Tiff {
                    source: TiffError::NotTiled,
                    ..
                }) => debug!("{} has no tiled pyramid, decoding it whole", identifier),
                Err(SlideError::Tiff {
                    source: TiffError::UnsupportedCompression(compression),
                    ..
                }) => warn!(
                    "{} uses {} tiles, decoding level 0 into memory",
                    identifier, compression
                ),
                Err(e) => return Err(e),
            }
        }

        self.raster.open(path, options).await.map(AnySlide::Raster)
    }
}

async fn has_tiff_header(path: &Path) -> Result<bool, SlideError> {
    let open_error = |e: std::io::Error| SlideError::Open {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    let mut file = tokio::fs::File::open(path).await.map_err(open_error)?;
    let mut header = [0u8; TIFF_HEADER_SIZE];
    match file.read_exact(&mut header).await {
        Ok(_) => Ok(is_tiff_header(&header)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(open_error(e)),
    }
}

fn decode_slide(path: &Path, options: &SlideOptions) -> Result<RasterSlide, SlideError> {
    let identifier = path.display().to_string();
    let open_error = |message: String| SlideError::Open {
        path: identifier.clone(),
        message,
    };

    let mut reader = ImageReader::open(path)
        .map_err(|e| open_error(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| open_error(e.to_string()))?;

    if options.allow_large_images {
        reader.no_limits();
    }

    let image = reader.decode().map_err(|e| SlideError::Decode {
        path: identifier.clone(),
        message: e.to_string(),
    })?;

    debug!(
        "Decoded {} ({}x{}, {:?})",
        identifier,
        image.width(),
        image.height(),
        image.color()
    );

    Ok(RasterSlide::new(identifier, image.to_rgba8()))
}
