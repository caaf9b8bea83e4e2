//! Resolver selection.

use std::sync::Arc;

use tracing::debug;
use veil_abac::AttributeResolver;
use veil_rbac::{PurposeResolver, RoleResolver};
use veil_types::{
    AccessModel, ItemId, PermissionDecision, PolicyLookupError, PolicyResolver, ResolveContext,
    ResolveStats, Resolution,
};

use crate::corpus::PolicyCorpus;

/// Builds the resolver enforcing `model` over the stores in `corpus`.
///
/// `audit` controls per-item grant and denial logging.
pub fn build_resolver(
    model: AccessModel,
    corpus: &PolicyCorpus,
    audit: bool,
) -> Arc<dyn PolicyResolver> {
    debug!(model = ?model, "Building resolver");
    match model {
        AccessModel::Abac => {
            let resolver = AttributeResolver::new(corpus.abac.clone());
            Arc::new(if audit { resolver } else { resolver.without_audit() })
        }
        AccessModel::Rbac => {
            let resolver = RoleResolver::new(corpus.rbac.clone());
            Arc::new(if audit { resolver } else { resolver.without_audit() })
        }
        AccessModel::Pbac => {
            let resolver = PurposeResolver::new(corpus.pbac.clone());
            Arc::new(if audit { resolver } else { resolver.without_audit() })
        }
        AccessModel::Unrestricted => Arc::new(UnrestrictedResolver),
    }
}

/// Grants every candidate without conditions and without lookups.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnrestrictedResolver;

impl PolicyResolver for UnrestrictedResolver {
    fn model(&self) -> AccessModel {
        AccessModel::Unrestricted
    }

    fn resolve(
        &self,
        candidates: &[ItemId],
        _context: &ResolveContext,
    ) -> Result<Resolution, PolicyLookupError> {
        Ok(Resolution {
            decision: PermissionDecision::grant_all(candidates),
            stats: ResolveStats::default(),
        })
    }
}
