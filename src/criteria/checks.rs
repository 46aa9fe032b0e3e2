//! Standard acceptance criteria.

use crate::patch::Patch;

use super::chain::Criterion;

/// Rejects a patch if any pixel is not fully opaque.
///
/// Regions read outside the scanned area come back padded with transparent
/// pixels.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlphaChannelCheck;

impl Criterion for AlphaChannelCheck {
    fn evaluate(&self, patch: &Patch) -> bool {
        patch.pixels.pixels().all(|p| p.0[3] == u8::MAX)
    }

    fn name(&self) -> &str {
        "alpha_channel_check"
    }
}

/// Rejects a patch whose rendered size differs from the configured size.
///
/// Catches tiles truncated by the slide boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchSizeCheck {
    height: u32,
    width: u32,
}

impl PatchSizeCheck {
    pub fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }
}

impl Criterion for PatchSizeCheck {
    fn evaluate(&self, patch: &Patch) -> bool {
        patch.dimensions() == (self.height, self.width)
    }

    fn name(&self) -> &str {
        "patch_size_check"
    }
}
