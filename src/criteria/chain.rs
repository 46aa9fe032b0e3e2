use std::fmt;

use crate::patch::Patch;

/// A pure acceptance predicate over a rendered patch.
///
/// Closures `Fn(&Patch) -> bool` implement this trait, so ad-hoc criteria
/// can be registered without declaring a type.
pub trait Criterion: Send + Sync {
    /// Returns `true` to accept the patch.
    fn evaluate(&self, patch: &Patch) -> bool;

    /// Name used in logs when this criterion rejects a patch.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<F> Criterion for F
where
    F: Fn(&Patch) -> bool + Send + Sync,
{
    fn evaluate(&self, patch: &Patch) -> bool {
        self(patch)
    }
}

/// Ordered, append-only list of criteria.
///
/// Built once before mining starts and shared read-only (behind an `Arc`)
/// by every render task afterwards.
#[derive(Default)]
pub struct CriteriaChain {
    criteria: Vec<Box<dyn Criterion>>,
}

impl CriteriaChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a criterion. Registration order is evaluation order.
    pub fn register<C>(&mut self, criterion: C) -> &mut Self
    where
        C: Criterion + 'static,
    {
        self.criteria.push(Box::new(criterion));
        self
    }

    /// Returns `true` only if every criterion accepts the patch.
    ///
    /// Stops at the first rejection; later criteria are not invoked.
    pub fn evaluate(&self, patch: &Patch) -> bool {
        self.first_rejection(patch).is_none()
    }

    /// Name of the first criterion that rejects the patch, if any.
    pub fn first_rejection(&self, patch: &Patch) -> Option<&str> {
        self.criteria
            .iter()
            .find(|criterion| !criterion.evaluate(patch))
            .map(|criterion| criterion.name())
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }
}

impl fmt::Debug for CriteriaChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.criteria.iter().map(|c| c.name()))
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
