//! Configuration management for the patch miner.
//!
//! Two layers:
//! - [`Cli`]: command-line arguments via clap (a few also read from
//!   `PATCH_MINER_*` environment variables), turned into a [`MiningRequest`].
//! - [`MiningConfig`]: the configuration document (`.json`, `.toml` or
//!   `.yaml`/`.yml`),
//!   validated once at load time into typed fields.
//!
//! # Configuration document
//!
//! ```toml
//! scale = 16                # thumbnail downsample factor (required)
//! patch_size = [256, 256]   # [height, width] (required)
//! read_type = "random"      # or "sequential"
//! overlap_factor = 0.0      # 0.0 <= f < 1.0
//! level = 0
//! seed = 42
//! save_format = "png"       # or "jpeg"
//! jpeg_quality = 90
//! labels = [1, 2]
//! allow_large_images = true
//!
//! [tissue]
//! min_saturation = 20
//! max_background_value = 200
//! cleanup_radius = 1
//! ```
//!
//! Keys not listed above are kept in [`MiningConfig::extra`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde_json::Value;

use crate::error::ConfigError;
use crate::mask::TissueMaskParams;
use crate::selector::{PatchFormat, ReadType};

// =============================================================================
// Default Values
// =============================================================================

/// Default JPEG quality for persisted patches.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Sentinel for `--num-patches` meaning "mine until saturation".
pub const UNTIL_SATURATION: i64 = -1;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Patch Miner - extract tissue patches from Whole Slide Images.
///
/// Builds a tissue mask from a slide thumbnail and mines fixed-size patches
/// from tissue regions, or replays the coordinates of a previous run.
#[derive(Parser, Debug, Clone)]
#[command(name = "patch-miner")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Input slide file.
    #[arg(short = 'i', long)]
    pub input_path: PathBuf,

    /// Number of patches to mine. Set to -1 to mine until saturation.
    #[arg(short = 'n', long, allow_negative_numbers = true)]
    pub num_patches: i64,

    /// Configuration document (.json or .toml).
    #[arg(short = 'c', long)]
    pub config: PathBuf,

    /// Label map image in thumbnail space.
    #[arg(long, visible_alias = "lm")]
    pub label_map_path: Option<PathBuf>,

    /// Directory for the patch images. Created if absent.
    #[arg(short = 'o', long)]
    pub output_path: Option<PathBuf>,

    /// Manifest of mined coordinates to write.
    #[arg(long, visible_alias = "ocsv")]
    pub output_csv: Option<PathBuf>,

    /// Manifest with x,y coordinates of patches to replay.
    #[arg(long, visible_alias = "icsv")]
    pub input_csv: Option<PathBuf>,

    /// Number of concurrent render workers (defaults to all cores).
    #[arg(short = 't', long, env = "PATCH_MINER_THREADS")]
    pub threads: Option<usize>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Cli {
    /// Validate the arguments and build a [`MiningRequest`].
    pub fn into_request(self) -> Result<MiningRequest, ConfigError> {
        let quota = PatchQuota::from_count(self.num_patches)?;

        let threads = match self.threads {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    key: "threads",
                    message: "must be greater than 0".to_string(),
                })
            }
            Some(n) => n,
            None => default_threads(),
        };

        Ok(MiningRequest {
            input_path: self.input_path,
            quota,
            config_path: self.config,
            label_map_path: self.label_map_path,
            output_path: self.output_path,
            output_csv: self.output_csv,
            input_csv: self.input_csv,
            threads,
        })
    }
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

// =============================================================================
// Mining Request
// =============================================================================

/// How many patches to accept before stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchQuota {
    /// Stop after this many accepted patches
    Limit(usize),

    /// Keep going until no candidates are left
    UntilSaturation,
}

impl PatchQuota {
    /// Parse the CLI count: `-1` means until saturation, otherwise `>= 1`.
    pub fn from_count(count: i64) -> Result<Self, ConfigError> {
        match count {
            UNTIL_SATURATION => Ok(Self::UntilSaturation),
            n if n >= 1 => Ok(Self::Limit(n as usize)),
            n => Err(ConfigError::InvalidValue {
                key: "num_patches",
                message: format!("must be -1 or a positive integer, got {}", n),
            }),
        }
    }

    /// Whether `accepted` patches satisfy the quota.
    pub fn is_met(&self, accepted: usize) -> bool {
        match self {
            Self::Limit(n) => accepted >= *n,
            Self::UntilSaturation => false,
        }
    }
}

/// Validated inputs of one mining run.
#[derive(Debug, Clone)]
pub struct MiningRequest {
    pub input_path: PathBuf,
    pub quota: PatchQuota,
    pub config_path: PathBuf,
    pub label_map_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub output_csv: Option<PathBuf>,
    pub input_csv: Option<PathBuf>,
    pub threads: usize,
}

impl MiningRequest {
    /// A mask-driven request with default options.
    pub fn new(
        input_path: impl Into<PathBuf>,
        quota: PatchQuota,
        config_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input_path: input_path.into(),
            quota,
            config_path: config_path.into(),
            label_map_path: None,
            output_path: None,
            output_csv: None,
            input_csv: None,
            threads: default_threads(),
        }
    }
}

// =============================================================================
// Mining Configuration
// =============================================================================

/// The validated configuration document.
#[derive(Debug, Clone, PartialEq)]
pub struct MiningConfig {
    /// Thumbnail downsample factor
    pub scale: u32,

    /// Patch size as `(height, width)`
    pub patch_size: (u32, u32),

    /// Candidate ordering
    pub read_type: ReadType,

    /// Fraction of a patch allowed to overlap accepted patches
    pub overlap_factor: f64,

    /// Pyramid level patches are read at
    pub level: usize,

    /// Seed for the random candidate order
    pub seed: Option<u64>,

    /// Encoding of persisted patches
    pub save_format: PatchFormat,

    /// JPEG quality when `save_format` is JPEG
    pub jpeg_quality: u8,

    /// Label-map classes to keep; `None` keeps all
    pub labels: Option<Vec<u8>>,

    /// Lift decoder memory limits when opening the slide
    pub allow_large_images: bool,

    /// Tissue segmentation thresholds
    pub tissue: TissueMaskParams,

    /// Unrecognized keys, forwarded untouched
    pub extra: BTreeMap<String, Value>,
}

impl MiningConfig {
    /// A configuration with only the required keys set.
    pub fn new(scale: u32, patch_size: (u32, u32)) -> Self {
        Self {
            scale,
            patch_size,
            read_type: ReadType::default(),
            overlap_factor: 0.0,
            level: 0,
            seed: None,
            save_format: PatchFormat::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            labels: None,
            allow_large_images: false,
            tissue: TissueMaskParams::default(),
            extra: BTreeMap::new(),
        }
    }

    /// Load and validate a `.json`, `.toml` or `.yaml`/`.yml` document.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let parse_error = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let document: BTreeMap<String, Value> = match extension.as_deref() {
            Some("json") => serde_json::from_str(&content).map_err(|e| parse_error(e.to_string()))?,
            Some("toml") => toml::from_str(&content).map_err(|e| parse_error(e.to_string()))?,
            Some("yaml" | "yml") => {
                serde_yaml::from_str(&content).map_err(|e| parse_error(e.to_string()))?
            }
            _ => {
                return Err(ConfigError::UnsupportedFormat {
                    path: path.to_path_buf(),
                })
            }
        };

        Self::from_document(document)
    }

    /// Validate a loosely-typed key/value document.
    pub fn from_document(mut doc: BTreeMap<String, Value>) -> Result<Self, ConfigError> {
        let scale = take_positive(&mut doc, "scale")?.ok_or(ConfigError::MissingKey("scale"))?;
        let patch_size = take_patch_size(&mut doc)?;
        let mut config = Self::new(scale, patch_size);

        if let Some(value) = doc.remove("read_type") {
            config.read_type = match value.as_str() {
                Some("random") => ReadType::Random,
                Some("sequential") => ReadType::Sequential,
                _ => return Err(invalid("read_type", "expected \"random\" or \"sequential\"", &value)),
            };
        }

        if let Some(value) = doc.remove("overlap_factor") {
            let factor = value
                .as_f64()
                .filter(|f| (0.0..1.0).contains(f))
                .ok_or_else(|| invalid("overlap_factor", "expected a number in [0, 1)", &value))?;
            config.overlap_factor = factor;
        }

        if let Some(value) = doc.remove("level") {
            config.level = value
                .as_u64()
                .ok_or_else(|| invalid("level", "expected a non-negative integer", &value))?
                as usize;
        }

        if let Some(value) = doc.remove("seed") {
            config.seed = Some(
                value
                    .as_u64()
                    .ok_or_else(|| invalid("seed", "expected a non-negative integer", &value))?,
            );
        }

        if let Some(value) = doc.remove("save_format") {
            config.save_format = match value.as_str().map(|s| s.to_ascii_lowercase()).as_deref() {
                Some("png") => PatchFormat::Png,
                Some("jpeg") | Some("jpg") => PatchFormat::Jpeg,
                _ => return Err(invalid("save_format", "expected \"png\" or \"jpeg\"", &value)),
            };
        }

        if let Some(value) = doc.remove("jpeg_quality") {
            config.jpeg_quality = value
                .as_u64()
                .filter(|q| (1..=100).contains(q))
                .ok_or_else(|| invalid("jpeg_quality", "expected an integer in 1..=100", &value))?
                as u8;
        }

        if let Some(value) = doc.remove("labels") {
            let labels: Vec<u8> = serde_json::from_value(value.clone())
                .map_err(|_| invalid("labels", "expected a list of integers in 0..=255", &value))?;
            config.labels = Some(labels);
        }

        if let Some(value) = doc.remove("allow_large_images") {
            config.allow_large_images = value
                .as_bool()
                .ok_or_else(|| invalid("allow_large_images", "expected a boolean", &value))?;
        }

        if let Some(value) = doc.remove("tissue") {
            config.tissue = serde_json::from_value(value).map_err(|e| ConfigError::InvalidValue {
                key: "tissue",
                message: e.to_string(),
            })?;
        }

        config.extra = doc;
        Ok(config)
    }
}

fn invalid(key: &'static str, expected: &str, got: &Value) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        message: format!("{}, got {}", expected, got),
    }
}

fn take_positive(
    doc: &mut BTreeMap<String, Value>,
    key: &'static str,
) -> Result<Option<u32>, ConfigError> {
    let Some(value) = doc.remove(key) else {
        return Ok(None);
    };
    value
        .as_u64()
        .filter(|&n| n >= 1 && n <= u64::from(u32::MAX))
        .map(|n| Some(n as u32))
        .ok_or_else(|| invalid(key, "expected a positive integer", &value))
}

fn take_patch_size(doc: &mut BTreeMap<String, Value>) -> Result<(u32, u32), ConfigError> {
    let value = doc
        .remove("patch_size")
        .ok_or(ConfigError::MissingKey("patch_size"))?;

    let dims: Option<Vec<u32>> = value.as_array().and_then(|items| {
        items
            .iter()
            .map(|item| {
                item.as_u64()
                    .filter(|&n| n >= 1 && n <= u64::from(u32::MAX))
                    .map(|n| n as u32)
            })
            .collect()
    });

    match dims.as_deref() {
        Some(&[height, width]) => Ok((height, width)),
        _ => Err(invalid(
            "patch_size",
            "expected [height, width] with two positive integers",
            &value,
        )),
    }
}

// =============================================================================
// Tests
// =============================================================================
