//! Purpose-based resolution.

use tracing::{debug, info};
use veil_types::{
    AccessModel, ItemId, PermissionDecision, PolicyLookupError, PolicyResolver, ResolveContext,
    ResolveStats, Resolution,
};

use crate::grants::merge_rows;
use crate::store::PurposeStore;

/// Purpose-based [`PolicyResolver`].
///
/// Same merge rule as [`crate::RoleResolver`], keyed by the single purpose
/// declared in the [`ResolveContext`].
#[derive(Debug)]
pub struct PurposeResolver<S> {
    store: S,
    audit_enabled: bool,
}

impl<S: PurposeStore> PurposeResolver<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            audit_enabled: true,
        }
    }

    /// Disables decision logging (for testing).
    pub fn without_audit(mut self) -> Self {
        self.audit_enabled = false;
        self
    }
}

impl<S: PurposeStore> PolicyResolver for PurposeResolver<S> {
    fn model(&self) -> AccessModel {
        AccessModel::Pbac
    }

    fn resolve(
        &self,
        candidates: &[ItemId],
        context: &ResolveContext,
    ) -> Result<Resolution, PolicyLookupError> {
        let mut stats = ResolveStats::default();
        let mut decision = PermissionDecision::new();

        stats.record_lookup();
        let rows = self.store.grants_for_purpose(&context.purpose)?;
        merge_rows("purpose", &rows, candidates, &mut decision, &mut stats)?;

        if self.audit_enabled {
            info!(
                purpose = %context.purpose,
                granted = decision.len(),
                candidates = candidates.len(),
                "Purpose grants resolved"
            );
        }
        debug!(applied = stats.applied_rules, "Purpose resolution complete");

        Ok(Resolution { decision, stats })
    }
}
