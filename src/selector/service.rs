//! Patch selection: mask-driven mining and manifest replay.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          PatchSelector                           │
//! │                                                                  │
//! │  mine()                                replay()                  │
//! │  1. Order valid mask pixels            1. Read manifest rows     │
//! │  2. Drop claimed / off-label           2. Render each row        │
//! │  3. Render a batch concurrently        3. Persist + manifest     │
//! │  4. Criteria chain per patch                                     │
//! │  5. Commit in candidate order                                    │
//! │  6. Persist + manifest                                           │
//! │           │                  │                     │             │
//! │           ▼                  ▼                     ▼             │
//! │    ┌─────────────┐   ┌──────────────┐    ┌──────────────────┐    │
//! │    │  ClaimGrid  │   │ Slide (Arc)  │    │   PatchWriter    │    │
//! │    └─────────────┘   └──────────────┘    └──────────────────┘    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rendering runs on a [`JoinSet`] with at most `workers` reads in flight.
//! Results are committed strictly in candidate order and overlap is
//! re-checked at commit time for every outcome, so neither the accepted set
//! nor the summary counters for a given seed depend on the worker count.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbaImage;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{MiningConfig, PatchQuota};
use crate::criteria::CriteriaChain;
use crate::error::{MiningError, SlideError};
use crate::geometry::ScaleFactor;
use crate::mask::{LabelMap, ValidityMask};
use crate::patch::{Patch, PatchCoordinate};
use crate::slide::Slide;

use super::manifest::{read_manifest, write_manifest, ManifestRow};
use super::sampler::{candidate_order, ClaimGrid, Footprint};
use super::writer::PatchWriter;

// =============================================================================
// Plan and Summary
// =============================================================================

/// Read-only inputs of a mask-driven run.
#[derive(Debug, Clone)]
pub struct MiningPlan {
    /// Where patches may be drawn from
    pub mask: Arc<ValidityMask>,

    /// Realized mask-to-slide factor
    pub scale: ScaleFactor,

    /// Acceptance predicates, evaluated in registration order
    pub criteria: Arc<CriteriaChain>,

    /// Optional per-pixel classes in mask space
    pub label_map: Option<Arc<LabelMap>>,
}

/// Outcome of a mining or replay run.
#[derive(Debug, Clone, Default)]
pub struct MiningSummary {
    /// Candidates rendered and evaluated
    pub examined: usize,

    /// Patches accepted (and persisted, when a writer is set)
    pub accepted: usize,

    /// Patches refused by a criterion
    pub rejected: usize,

    /// Candidates whose region could not be read
    pub read_failures: usize,

    /// Candidates dropped without rendering (overlap or label filter)
    pub skipped: usize,

    /// Whether the run ended because candidates ran out
    pub saturated: bool,

    /// One row per accepted patch, in acceptance order
    pub rows: Vec<ManifestRow>,
}

/// Result of rendering and evaluating one candidate.
enum Outcome {
    Accepted(Patch),
    Rejected(String),
    Failed(SlideError),
}

/// A candidate that passed the pre-render filters.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    coordinate: PatchCoordinate,
    footprint: Footprint,
    label: Option<u8>,
    /// Candidates filtered out between the previous one and this one
    skipped_before: usize,
}

// =============================================================================
// Patch Selector
// =============================================================================

/// Selects, renders and persists patches from one slide.
pub struct PatchSelector<S: Slide> {
    slide: Arc<S>,
    config: MiningConfig,
    workers: usize,
    writer: Option<PatchWriter>,
}

impl<S: Slide + 'static> PatchSelector<S> {
    /// Create a selector with one worker and no persistence.
    pub fn new(slide: Arc<S>, config: MiningConfig) -> Self {
        Self {
            slide,
            config,
            workers: 1,
            writer: None,
        }
    }

    /// Set the maximum number of concurrent region reads.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Persist accepted patches through `writer`.
    pub fn with_writer(mut self, writer: PatchWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn config(&self) -> &MiningConfig {
        &self.config
    }

    /// Mine patches from the valid pixels of `plan.mask`.
    ///
    /// Stops once `quota` is met or no candidates remain. When `output_csv`
    /// is given the accepted rows are written there.
    pub async fn mine(
        &self,
        plan: &MiningPlan,
        quota: PatchQuota,
        output_csv: Option<&Path>,
    ) -> Result<MiningSummary, MiningError> {
        let level = self.config.level;
        let downsample = self
            .slide
            .level_downsample(level)
            .ok_or(SlideError::InvalidLevel {
                level,
                level_count: self.slide.level_count(),
            })?;

        let (patch_h, patch_w) = self.config.patch_size;
        let level0_w = f64::from(patch_w) * downsample;
        let level0_h = f64::from(patch_h) * downsample;
        let keep = 1.0 - self.config.overlap_factor;
        let (claim_w, claim_h) = plan.scale.extent_to_mask(level0_w * keep, level0_h * keep);
        let (extent_w, extent_h) = plan.scale.extent_to_mask(level0_w, level0_h);

        let whitelist = match (&self.config.labels, &plan.label_map) {
            (Some(_), None) => {
                warn!("Label whitelist configured without a label map; ignoring it");
                None
            }
            (labels, _) => labels.as_deref(),
        };

        let (mask_w, mask_h) = plan.mask.dimensions();
        let mut claims = ClaimGrid::new(mask_w, mask_h);
        let order = candidate_order(&plan.mask, self.config.read_type, self.config.seed);

        info!(
            "Mining {} candidates (claim footprint {}x{} mask pixels, {} workers)",
            order.len(),
            claim_w,
            claim_h,
            self.workers
        );

        let mut summary = MiningSummary::default();
        let mut remaining = order.into_iter();

        'mining: loop {
            if quota.is_met(summary.accepted) {
                break;
            }

            // Fill a batch with candidates that pass the cheap filters.
            let mut batch = Vec::with_capacity(self.workers);
            let mut pending_skips = 0;
            for (mx, my) in remaining.by_ref() {
                let footprint = Footprint::new(mx, my, claim_w, claim_h);
                if !claims.is_free(&footprint) {
                    pending_skips += 1;
                    continue;
                }

                let label = plan.label_map.as_ref().and_then(|map| {
                    let cx = (mx + extent_w / 2).min(mask_w.saturating_sub(1));
                    let cy = (my + extent_h / 2).min(mask_h.saturating_sub(1));
                    map.label_at(cx, cy)
                });
                if let Some(allowed) = whitelist {
                    if !label.is_some_and(|l| allowed.contains(&l)) {
                        pending_skips += 1;
                        continue;
                    }
                }

                let (x, y) = plan.scale.to_slide(mx, my);
                batch.push(Candidate {
                    coordinate: PatchCoordinate::new(x, y, self.config.patch_size).at_level(level),
                    footprint,
                    label,
                    skipped_before: std::mem::take(&mut pending_skips),
                });
                if batch.len() == self.workers {
                    break;
                }
            }

            // Only non-zero once candidates ran out.
            summary.skipped += pending_skips;

            if batch.is_empty() {
                summary.saturated = true;
                break;
            }

            let outcomes = self.render_batch(&batch, Some(&plan.criteria)).await?;

            for (candidate, outcome) in batch.iter().zip(outcomes) {
                if quota.is_met(summary.accepted) {
                    break 'mining;
                }
                summary.skipped += candidate.skipped_before;

                // An earlier patch of this batch may have claimed the area.
                // Whatever the outcome, a single-worker run would never have
                // rendered this candidate.
                if !claims.is_free(&candidate.footprint) {
                    summary.skipped += 1;
                    continue;
                }
                summary.examined += 1;

                match outcome {
                    Outcome::Failed(e) => {
                        warn!(
                            "Failed to read patch at ({}, {}): {}",
                            candidate.coordinate.x, candidate.coordinate.y, e
                        );
                        summary.read_failures += 1;
                    }
                    Outcome::Rejected(criterion) => {
                        debug!(
                            "Patch at ({}, {}) rejected by {}",
                            candidate.coordinate.x, candidate.coordinate.y, criterion
                        );
                        summary.rejected += 1;
                    }
                    Outcome::Accepted(patch) => {
                        claims.claim(&candidate.footprint);
                        let path = self.persist(&candidate.coordinate, patch.pixels).await?;
                        debug!(
                            "Accepted patch at ({}, {})",
                            candidate.coordinate.x, candidate.coordinate.y
                        );
                        summary.accepted += 1;
                        summary.rows.push(ManifestRow {
                            coordinate: candidate.coordinate,
                            label: candidate.label,
                            path,
                        });
                    }
                }
            }
        }

        if let Some(csv) = output_csv {
            write_manifest(csv, &summary.rows)?;
            info!("Wrote {} manifest rows to {}", summary.rows.len(), csv.display());
        }

        Ok(summary)
    }

    /// Re-extract every patch listed in `input_csv`.
    ///
    /// No mask or criteria are involved. Any read failure aborts the run.
    pub async fn replay(
        &self,
        input_csv: &Path,
        output_csv: Option<&Path>,
    ) -> Result<MiningSummary, MiningError> {
        let rows = read_manifest(input_csv, self.config.patch_size, self.config.level)?;
        info!("Replaying {} patches from {}", rows.len(), input_csv.display());

        let mut summary = MiningSummary::default();
        for chunk in rows.chunks(self.workers) {
            let batch: Vec<Candidate> = chunk
                .iter()
                .map(|row| Candidate {
                    coordinate: row.coordinate,
                    footprint: Footprint::new(0, 0, 0, 0),
                    label: row.label,
                    skipped_before: 0,
                })
                .collect();

            let outcomes = self.render_batch(&batch, None).await?;

            for (candidate, outcome) in batch.iter().zip(outcomes) {
                let coordinate = candidate.coordinate;
                summary.examined += 1;
                let pixels = match outcome {
                    Outcome::Accepted(patch) => patch.pixels,
                    Outcome::Failed(source) => {
                        return Err(MiningError::Replay {
                            x: coordinate.x,
                            y: coordinate.y,
                            source,
                        })
                    }
                    // Replay has no criteria
                    Outcome::Rejected(_) => continue,
                };

                let path = self.persist(&coordinate, pixels).await?;
                summary.accepted += 1;
                summary.rows.push(ManifestRow {
                    coordinate,
                    label: candidate.label,
                    path,
                });
            }
        }
        summary.saturated = true;

        if let Some(csv) = output_csv {
            write_manifest(csv, &summary.rows)?;
            info!("Wrote {} manifest rows to {}", summary.rows.len(), csv.display());
        }

        Ok(summary)
    }

    /// Render every candidate concurrently, returning outcomes in batch order.
    async fn render_batch(
        &self,
        batch: &[Candidate],
        criteria: Option<&Arc<CriteriaChain>>,
    ) -> Result<Vec<Outcome>, MiningError> {
        let mut tasks = JoinSet::new();
        for (index, candidate) in batch.iter().enumerate() {
            let slide = Arc::clone(&self.slide);
            let criteria = criteria.cloned();
            let coordinate = candidate.coordinate;
            let label = candidate.label;

            tasks.spawn(async move {
                let size = (coordinate.width, coordinate.height);
                let outcome = match slide
                    .read_region(coordinate.x, coordinate.y, coordinate.level, size)
                    .await
                {
                    Err(e) => Outcome::Failed(e),
                    Ok(pixels) => {
                        let patch = Patch::new(pixels, coordinate, label);
                        let rejection = criteria
                            .as_ref()
                            .and_then(|c| c.first_rejection(&patch))
                            .map(str::to_string);
                        match rejection {
                            Some(name) => Outcome::Rejected(name),
                            None => Outcome::Accepted(patch),
                        }
                    }
                };
                (index, outcome)
            });
        }

        let mut outcomes: Vec<Option<Outcome>> = batch.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (index, outcome) = joined.map_err(|e| SlideError::Task(e.to_string()))?;
            outcomes[index] = Some(outcome);
        }

        Ok(outcomes
            .into_iter()
            .map(|o| {
                o.unwrap_or_else(|| Outcome::Failed(SlideError::Task("render task lost".into())))
            })
            .collect())
    }

    async fn persist(
        &self,
        coordinate: &PatchCoordinate,
        pixels: RgbaImage,
    ) -> Result<Option<PathBuf>, MiningError> {
        match &self.writer {
            Some(writer) => writer.save(coordinate, pixels).await.map(Some),
            None => Ok(None),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
