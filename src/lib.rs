//! # Patch Miner
//!
//! Extracts fixed-size patches from tissue regions of Whole Slide Images for
//! downstream machine-learning pipelines.
//!
//! ## Features
//!
//! - **Tissue masking**: Otsu-thresholded saturation/brightness segmentation of a slide thumbnail
//! - **Exact coordinate mapping**: Scale factors recomputed from the realized thumbnail size
//! - **Composable criteria**: Append-only chain of acceptance predicates
//! - **Two modes**: Mask-driven mining, or faithful replay of a previous manifest
//! - **Concurrent rendering**: Region reads fan out over a Tokio `JoinSet`
//! - **Tiled pyramids**: Aperio SVS and pyramidal TIFFs are read tile by tile, only the tiles a region covers
//!
//! ## Architecture
//!
//! - [`geometry`] - Thumbnail/slide scale mapping
//! - [`mask`] - Tissue validity mask and label map
//! - [`criteria`] - Patch acceptance criteria
//! - [`io`] - Positioned byte-range reads
//! - [`format`] - TIFF/SVS structure parsing and JPEG tile preparation
//! - [`slide`] - Slide abstraction, raster and tiled backends
//! - [`selector`] - Candidate sampling, rendering, persistence and manifests
//! - [`driver`] - Precondition checks and mode dispatch
//! - [`config`] - CLI and configuration document
//!
//! ## Example
//!
//! ```rust,no_run
//! use patch_miner::{driver, AutoSlideSource, MiningRequest, PatchQuota};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut request = MiningRequest::new("slide.tiff", PatchQuota::Limit(500), "config.toml");
//!     request.output_path = Some("patches".into());
//!     request.output_csv = Some("patches/manifest.csv".into());
//!
//!     match driver::run(&request, &AutoSlideSource::new()).await {
//!         Ok(summary) => println!("accepted {} patches", summary.accepted),
//!         Err(e) => eprintln!("{}", e),
//!     }
//! }
//! ```

pub mod config;
pub mod criteria;
pub mod driver;
pub mod error;
pub mod format;
pub mod geometry;
pub mod io;
pub mod mask;
pub mod patch;
pub mod selector;
pub mod slide;

// Re-export commonly used types
pub use config::{Cli, MiningConfig, MiningRequest, PatchQuota};
pub use criteria::{AlphaChannelCheck, CriteriaChain, Criterion, PatchSizeCheck};
pub use driver::{generate_initial_mask, run, standard_criteria, MiningMode};
pub use error::{
    ConfigError, GeometryError, IoError, ManifestError, MiningError, SlideError, TiffError,
};
pub use geometry::{thumbnail_dimensions, ScaleFactor};
pub use mask::{tissue_mask, LabelMap, TissueMaskParams, ValidityMask};
pub use patch::{Patch, PatchCoordinate, PatchMetadata};
pub use selector::{
    ManifestRow, MiningPlan, MiningSummary, PatchFormat, PatchSelector, PatchWriter, ReadType,
};
pub use slide::{
    AnySlide, AutoSlideSource, LocalSlideSource, RasterSlide, Slide, SlideOptions, SlideSource,
    TiffSlide, TiffSlideSource,
};
