use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating the mining configuration
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// The configuration document could not be read from disk
    #[error("Failed to read config {path}: {message}")]
    Read { path: PathBuf, message: String },

    /// The configuration document is not valid JSON/TOML
    #[error("Failed to parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Document extension is neither `.json` nor `.toml`
    #[error("Unsupported config format for {path}: expected a .json, .toml, .yaml or .yml file")]
    UnsupportedFormat { path: PathBuf },

    /// A required key is absent
    #[error("Missing required config key: {0}")]
    MissingKey(&'static str),

    /// A key is present but its value is out of range or of the wrong shape
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}

/// Errors in thumbnail/slide coordinate mapping
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    /// Scale factor is zero or produces an empty thumbnail
    #[error("Invalid scale {scale} for slide of {width}x{height} pixels")]
    InvalidScale { scale: i64, width: u32, height: u32 },

    /// A rendered thumbnail has a zero dimension
    #[error(
        "Degenerate {thumb_w}x{thumb_h} thumbnail for slide of {width}x{height} pixels"
    )]
    DegenerateThumbnail {
        width: u32,
        height: u32,
        thumb_w: u32,
        thumb_h: u32,
    },
}

/// Errors from byte-range reads against a slide file
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// The underlying file could not be opened or read
    #[error("Failed to read {path}: {message}")]
    Read { path: String, message: String },

    /// Requested range exceeds the file
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },
}

/// Errors that can occur when parsing TIFF structure
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// Buffer is too small for the structure being parsed
    #[error("Truncated TIFF data: need at least {required} bytes, got {actual}")]
    Truncated { required: u64, actual: u64 },

    /// IFD offset points outside the file
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// IFD declares an implausible number of entries
    #[error("IFD declares {0} entries")]
    TooManyEntries(u64),

    /// Required tag is missing from an IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has an unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// No IFD forms a tiled pyramid level
    #[error("No tiled pyramid levels found")]
    NotTiled,

    /// Tiles use a compression scheme the tile decoder cannot handle
    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),
}

/// Errors that can occur when opening or rendering a slide
#[derive(Debug, Clone, Error)]
pub enum SlideError {
    /// Slide file does not exist
    #[error("Slide not found: {0}")]
    NotFound(String),

    /// The file exists but could not be opened as an image
    #[error("Failed to open slide {path}: {message}")]
    Open { path: String, message: String },

    /// Pixel decoding failed
    #[error("Failed to decode slide {path}: {message}")]
    Decode { path: String, message: String },

    /// Tiled TIFF structure could not be read
    #[error("Failed to read TIFF structure of {path}: {source}")]
    Tiff {
        path: String,
        #[source]
        source: TiffError,
    },

    /// Requested pyramid level does not exist
    #[error("Invalid level {level}: slide has {level_count} levels")]
    InvalidLevel { level: usize, level_count: usize },

    /// Requested region has a zero dimension
    #[error("Invalid region size {width}x{height}")]
    InvalidRegion { width: u32, height: u32 },

    /// Background rendering task failed
    #[error("Render task failed: {0}")]
    Task(String),
}

/// Errors reading or writing a patch manifest
#[derive(Debug, Clone, Error)]
pub enum ManifestError {
    /// File could not be read or written
    #[error("Manifest I/O error for {path}: {message}")]
    Io { path: PathBuf, message: String },

    /// A row could not be parsed
    #[error("Manifest parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// The header lacks a required column
    #[error("Manifest is missing required column '{0}'")]
    MissingColumn(&'static str),
}

/// Top-level errors of a mining run
#[derive(Debug, Clone, Error)]
pub enum MiningError {
    /// The input slide path does not exist (fatal precondition)
    #[error("Could not find the slide at {}, could you recheck the path?", path.display())]
    SlideNotFound { path: PathBuf },

    /// The output directory could not be created
    #[error("Failed to create output directory {path}: {message}")]
    OutputDirectory { path: PathBuf, message: String },

    /// An accepted patch could not be written
    #[error("Failed to persist patch to {path}: {message}")]
    Persist { path: PathBuf, message: String },

    /// The label map could not be loaded
    #[error("Failed to load label map {path}: {message}")]
    LabelMap { path: PathBuf, message: String },

    /// A replayed coordinate could not be rendered
    #[error("Failed to replay patch at ({x}, {y}): {source}")]
    Replay {
        x: u32,
        y: u32,
        #[source]
        source: SlideError,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Geometry error
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// Slide access error
    #[error("Slide error: {0}")]
    Slide(#[from] SlideError),

    /// Manifest error
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),
}
