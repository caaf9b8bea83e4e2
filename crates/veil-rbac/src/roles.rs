//! Role-based resolution.

use tracing::{debug, info, warn};
use veil_types::{
    AccessModel, ItemId, PermissionDecision, PolicyLookupError, PolicyResolver, ResolveContext,
    ResolveStats, Resolution,
};

use crate::grants::merge_rows;
use crate::store::RoleStore;

/// Role-based [`PolicyResolver`].
///
/// Unions the grant rules of every role the subject holds. Items that no
/// rule mentions are denied.
#[derive(Debug)]
pub struct RoleResolver<S> {
    store: S,
    audit_enabled: bool,
}

impl<S: RoleStore> RoleResolver<S> {
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

impl<S: RoleStore> PolicyResolver for RoleResolver<S> {
    fn model(&self) -> AccessModel {
        AccessModel::Rbac
    }

    fn resolve(
        &self,
        candidates: &[ItemId],
        context: &ResolveContext,
    ) -> Result<Resolution, PolicyLookupError> {
        let mut stats = ResolveStats::default();
        let mut decision = PermissionDecision::new();

        stats.record_lookup();
        let roles = self.store.roles_of(&context.subject)?;
        if roles.is_empty() {
            if self.audit_enabled {
                warn!(subject = %context.subject, "Subject holds no roles");
            }
            return Ok(Resolution { decision, stats });
        }

        stats.record_lookup();
        let rows = self.store.grants_for_roles(&roles)?;
        merge_rows("role", &rows, candidates, &mut decision, &mut stats)?;

        if self.audit_enabled {
            let denied: Vec<&ItemId> = candidates
                .iter()
                .filter(|item| !decision.is_granted(item))
                .collect();
            info!(
                subject = %context.subject,
                roles = ?roles,
                granted = decision.len(),
                "Role grants resolved"
            );
            if !denied.is_empty() {
                warn!(subject = %context.subject, denied_items = ?denied, "Items denied by role policy");
            }
        }
        debug!(lookups = stats.lookups, applied = stats.applied_rules, "Role resolution complete");

        Ok(Resolution { decision, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryRoleStore, RoleGrant};

    fn ids(items: &[&str]) -> Vec<ItemId> {
        items.iter().map(|i| ItemId::from(*i)).collect()
    }

    fn resolver(store: InMemoryRoleStore) -> RoleResolver<InMemoryRoleStore> {
        RoleResolver::new(store).without_audit()
    }

    #[test]
    fn test_union_across_roles() {
        let store = InMemoryRoleStore::new()
            .assign("Alice", "CEO")
            .assign("Alice", "auditor")
            .with_grant(RoleGrant::new("CEO", "l_returnflag", None))
            .with_grant(RoleGrant::new("auditor", "l_linestatus", Some("l_quantity > 10")));
        let res = resolver(store)
            .resolve(
                &ids(&["l_returnflag", "l_linestatus", "sum(l_tax)"]),
                &ResolveContext::new("Alice"),
            )
            .unwrap();

        assert_eq!(res.decision.len(), 2);
        assert!(!res.decision.is_granted(&ItemId::from("sum(l_tax)")));
        assert_eq!(res.stats.lookups, 2);
        assert_eq!(res.stats.applied_rules, 2);
    }

    #[test]
    fn test_conditions_from_several_roles_conjoin() {
        let store = InMemoryRoleStore::new()
            .assign("Alice", "CEO")
            .assign("Alice", "CFO")
            .with_grant(RoleGrant::new("CEO", "o_orderdate", Some("o_totalprice > 1000")))
            .with_grant(RoleGrant::new("CFO", "o_orderdate", Some("o_orderstatus = 'F'")));
        let res = resolver(store)
            .resolve(&ids(&["o_orderdate"]), &ResolveContext::new("Alice"))
            .unwrap();
        assert_eq!(
            res.decision
                .condition(&ItemId::from("o_orderdate"))
                .unwrap()
                .predicate(),
            "o_totalprice > 1000 and o_orderstatus = 'F'"
        );
    }

    #[test]
    fn test_subject_without_roles_gets_nothing() {
        let store = InMemoryRoleStore::new().with_grant(RoleGrant::new("CEO", "l_tax", None));
        let res = resolver(store)
            .resolve(&ids(&["l_tax"]), &ResolveContext::new("Mallory"))
            .unwrap();
        assert!(res.decision.is_empty());
        assert_eq!(res.stats.lookups, 1);
    }
}
