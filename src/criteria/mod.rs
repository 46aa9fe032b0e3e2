//! Patch acceptance criteria.
//!
//! A candidate patch is accepted only if every registered [`Criterion`]
//! accepts it. Criteria are independent values appended to a
//! [`CriteriaChain`] and evaluated in registration order; evaluation stops at
//! the first rejection.
//!
//! # Example
//!
//! ```
//! use patch_miner::criteria::{AlphaChannelCheck, CriteriaChain, PatchSizeCheck};
//! use patch_miner::patch::Patch;
//!
//! let mut chain = CriteriaChain::new();
//! chain
//!     .register(AlphaChannelCheck)
//!     .register(PatchSizeCheck::new(256, 256))
//!     .register(|patch: &Patch| patch.metadata.label != Some(0));
//!
//! assert_eq!(chain.len(), 3);
//! ```

mod chain;
mod checks;

pub use chain::{CriteriaChain, Criterion};
pub use checks::{AlphaChannelCheck, PatchSizeCheck};
