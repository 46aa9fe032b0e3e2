//! Patch persistence.
//!
//! Accepted patches are encoded in memory and written to
//! `<prefix>_<x>_<y>.<ext>` in the output directory. Encoding runs on the
//! blocking pool; the write itself uses `tokio::fs`.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageResult, RgbaImage};

use crate::error::MiningError;
use crate::patch::PatchCoordinate;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

/// On-disk encoding of persisted patches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PatchFormat {
    /// Lossless, alpha preserved
    #[default]
    Png,

    /// Lossy, alpha dropped
    Jpeg,
}

impl PatchFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

/// Encodes patches and writes them to an output directory.
#[derive(Debug, Clone)]
pub struct PatchWriter {
    directory: PathBuf,
    prefix: String,
    format: PatchFormat,
    quality: u8,
}

impl PatchWriter {
    /// Create a writer. `quality` only applies to JPEG and is clamped to 1..=100.
    pub fn new(
        directory: impl Into<PathBuf>,
        prefix: impl Into<String>,
        format: PatchFormat,
        quality: u8,
    ) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
            format,
            quality: quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn format(&self) -> PatchFormat {
        self.format
    }

    /// Destination file for a patch.
    pub fn path_for(&self, coordinate: &PatchCoordinate) -> PathBuf {
        self.directory.join(format!(
            "{}_{}_{}.{}",
            self.prefix,
            coordinate.x,
            coordinate.y,
            self.format.extension()
        ))
    }

    /// Encode `pixels` in the configured format.
    pub fn encode(&self, pixels: &RgbaImage) -> ImageResult<Bytes> {
        encode(pixels, self.format, self.quality)
    }

    /// Encode and write one patch, returning the written path.
    pub async fn save(
        &self,
        coordinate: &PatchCoordinate,
        pixels: RgbaImage,
    ) -> Result<PathBuf, MiningError> {
        let path = self.path_for(coordinate);
        let persist_error = |message: String| MiningError::Persist {
            path: path.clone(),
            message,
        };

        let (format, quality) = (self.format, self.quality);
        let data = tokio::task::spawn_blocking(move || encode(&pixels, format, quality))
            .await
            .map_err(|e| persist_error(e.to_string()))?
            .map_err(|e| persist_error(e.to_string()))?;

        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| persist_error(e.to_string()))?;

        Ok(path)
    }
}

fn encode(pixels: &RgbaImage, format: PatchFormat, quality: u8) -> ImageResult<Bytes> {
    let mut output = Vec::new();
    match format {
        PatchFormat::Png => {
            PngEncoder::new(Cursor::new(&mut output)).write_image(
                pixels.as_raw(),
                pixels.width(),
                pixels.height(),
                ExtendedColorType::Rgba8,
            )?;
        }
        PatchFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgba8(pixels.clone()).to_rgb8();
            JpegEncoder::new_with_quality(&mut output, quality).encode_image(&rgb)?;
        }
    }
    Ok(Bytes::from(output))
}

// =============================================================================
// Tests
// =============================================================================
