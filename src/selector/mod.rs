//! Patch selection.
//!
//! - `sampler`: candidate ordering and overlap claims in mask space
//! - `manifest`: the CSV of accepted patch coordinates
//! - `writer`: PNG/JPEG persistence of accepted patches
//! - `service`: [`PatchSelector`], which drives mining and replay

mod manifest;
mod sampler;
mod service;
mod writer;

pub use manifest::{parse_manifest, read_manifest, write_manifest, ManifestRow, MANIFEST_HEADER};
pub use sampler::{candidate_order, ClaimGrid, Footprint, ReadType};
pub use service::{MiningPlan, MiningSummary, PatchSelector};
pub use writer::{PatchFormat, PatchWriter, MAX_JPEG_QUALITY, MIN_JPEG_QUALITY};
