//! Run orchestration.
//!
//! [`run`] validates preconditions, loads the configuration, opens the slide
//! and dispatches to one of two modes, chosen once from the request:
//!
//! ```text
//!                    ┌──────────────┐
//!                    │ MiningRequest│
//!                    └──────┬───────┘
//!                           │ slide exists? output dir? config?
//!                           ▼
//!              input_csv?  ┌─────────┐
//!          ┌───── yes ─────┤ dispatch├──── no ──────┐
//!          ▼               └─────────┘              ▼
//!   ┌─────────────┐                     ┌────────────────────────┐
//!   │   replay    │                     │ thumbnail → mask →     │
//!   │ (manifest)  │                     │ scale → criteria → mine│
//!   └─────────────┘                     └────────────────────────┘
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::{MiningConfig, MiningRequest};
use crate::criteria::{AlphaChannelCheck, CriteriaChain, PatchSizeCheck};
use crate::error::MiningError;
use crate::geometry::{thumbnail_dimensions, ScaleFactor};
use crate::mask::{tissue_mask, LabelMap, TissueMaskParams, ValidityMask};
use crate::selector::{MiningPlan, MiningSummary, PatchSelector, PatchWriter};
use crate::slide::{Slide, SlideOptions, SlideSource};

/// Which entry point of the selector a run uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiningMode {
    /// Sample candidates from the tissue mask
    MaskDriven,

    /// Re-extract the coordinates listed in this manifest
    Replay(PathBuf),
}

impl MiningMode {
    pub fn from_request(request: &MiningRequest) -> Self {
        match &request.input_csv {
            Some(csv) => Self::Replay(csv.clone()),
            None => Self::MaskDriven,
        }
    }
}

/// Render the thumbnail and segment it.
///
/// Returns the mask together with the scale factor realized by the
/// thumbnail, which may differ slightly from `scale`.
pub async fn generate_initial_mask<S: Slide>(
    slide: &S,
    scale: u32,
    params: &TissueMaskParams,
) -> Result<(ValidityMask, ScaleFactor), MiningError> {
    let (width, height) = slide.dimensions();
    let (max_w, max_h) = thumbnail_dimensions(width, height, i64::from(scale))?;

    let thumbnail = slide.thumbnail(max_w, max_h).await?;
    let realized = ScaleFactor::from_dimensions((width, height), thumbnail.dimensions())?;
    debug!(
        "Thumbnail {}x{} for {}x{} slide (sx={:.4}, sy={:.4})",
        thumbnail.width(),
        thumbnail.height(),
        width,
        height,
        realized.sx,
        realized.sy
    );

    let mask = tissue_mask(&thumbnail, params);
    Ok((mask, realized))
}

/// The criteria every mask-driven run applies: opacity, then exact size.
pub fn standard_criteria(config: &MiningConfig) -> CriteriaChain {
    let (height, width) = config.patch_size;
    let mut chain = CriteriaChain::new();
    chain
        .register(AlphaChannelCheck)
        .register(PatchSizeCheck::new(height, width));
    chain
}

/// Execute one mining run.
pub async fn run<S: SlideSource>(
    request: &MiningRequest,
    source: &S,
) -> Result<MiningSummary, MiningError> {
    let started = Instant::now();

    if !request.input_path.exists() {
        return Err(MiningError::SlideNotFound {
            path: request.input_path.clone(),
        });
    }

    if let Some(ref output) = request.output_path {
        ensure_output_directory(output)?;
    }

    let config = MiningConfig::load(&request.config_path)?;
    info!(
        "Loaded config {} (scale {}, patch {}x{})",
        request.config_path.display(),
        config.scale,
        config.patch_size.0,
        config.patch_size.1
    );
    if !config.extra.is_empty() {
        debug!(
            "Unrecognized config keys: {:?}",
            config.extra.keys().collect::<Vec<_>>()
        );
    }

    let options = SlideOptions {
        allow_large_images: config.allow_large_images,
    };
    let slide = Arc::new(source.open(&request.input_path, &options).await?);
    let (width, height) = slide.dimensions();
    info!(
        "Opened slide {} ({}x{}, {} levels)",
        slide.identifier(),
        width,
        height,
        slide.level_count()
    );

    let mut selector =
        PatchSelector::new(Arc::clone(&slide), config.clone()).with_workers(request.threads);
    if let Some(ref output) = request.output_path {
        selector = selector.with_writer(PatchWriter::new(
            output,
            slide_stem(&request.input_path),
            config.save_format,
            config.jpeg_quality,
        ));
    }

    let summary = match MiningMode::from_request(request) {
        MiningMode::Replay(input_csv) => {
            if request.label_map_path.is_some() {
                warn!("Label map is ignored when replaying a manifest");
            }
            selector
                .replay(&input_csv, request.output_csv.as_deref())
                .await?
        }
        MiningMode::MaskDriven => {
            let (mask, scale) =
                generate_initial_mask(slide.as_ref(), config.scale, &config.tissue).await?;
            info!(
                "Tissue mask {}x{} with {} valid pixels",
                mask.width(),
                mask.height(),
                mask.count_valid()
            );

            let label_map = match request.label_map_path {
                Some(ref path) => {
                    let map = LabelMap::load(path)?.fit_to(mask.width(), mask.height());
                    Some(Arc::new(map))
                }
                None => None,
            };

            let plan = MiningPlan {
                mask: Arc::new(mask),
                scale,
                criteria: Arc::new(standard_criteria(&config)),
                label_map,
            };
            selector
                .mine(&plan, request.quota, request.output_csv.as_deref())
                .await?
        }
    };

    info!(
        "Accepted {} patches ({} examined, {} rejected, {} read failures, {} skipped){}",
        summary.accepted,
        summary.examined,
        summary.rejected,
        summary.read_failures,
        summary.skipped,
        if summary.saturated { ", saturated" } else { "" }
    );
    info!("Total time: {:.2?}", started.elapsed());

    Ok(summary)
}

fn ensure_output_directory(path: &Path) -> Result<(), MiningError> {
    if path.is_dir() {
        return Ok(());
    }

    info!("Output directory {} does not exist, creating it", path.display());
    std::fs::create_dir_all(path).map_err(|e| MiningError::OutputDirectory {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// File-name prefix for persisted patches.
fn slide_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "patch".to_string())
}
