//! Permission decisions and residual conditions.

use std::collections::BTreeMap;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{ItemId, Table};

// ============================================================================
// Condition
// ============================================================================

/// A residual row predicate attached to a granted item.
///
/// Held as a list of conjuncts; the rendered predicate joins them with
/// `and`. The table affinity is derived from the leading column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition {
    conjuncts: Vec<String>,
}

impl Condition {
    pub fn new(predicate: impl Into<String>) -> Self {
        Self {
            conjuncts: vec![predicate.into().trim().to_string()],
        }
    }

    /// Rendered predicate, conjuncts joined with `and`.
    pub fn predicate(&self) -> String {
        self.conjuncts.join(" and ")
    }

    pub fn conjuncts(&self) -> &[String] {
        &self.conjuncts
    }

    /// True if any conjunct is empty.
    pub fn is_blank(&self) -> bool {
        self.conjuncts.iter().any(String::is_empty)
    }

    pub fn affinity(&self) -> Option<Table> {
        self.conjuncts
            .first()
            .and_then(|first| Table::affinity_of(first))
    }

    /// Appends the conjuncts of `other` that are not already present.
    ///
    /// Returns true if the condition changed.
    pub fn conjoin(&mut self, other: &Condition) -> bool {
        let mut changed = false;
        for conjunct in &other.conjuncts {
            if !self.conjuncts.contains(conjunct) {
                self.conjuncts.push(conjunct.clone());
                changed = true;
            }
        }
        changed
    }

    /// Splits into one single-predicate condition per conjunct.
    pub fn split(&self) -> impl Iterator<Item = Condition> + '_ {
        self.conjuncts.iter().map(Condition::new)
    }
}

impl Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.predicate())
    }
}

// ============================================================================
// Permission decision
// ============================================================================

/// Granted output items and their residual conditions.
///
/// An item absent from the decision is denied. Grants merge by one law:
/// conditioned grants always win. The residual condition of an item is the
/// conjunction of every distinct conditioned grant in arrival order; an
/// unconditional grant only marks the item as granted and never weakens a
/// condition, whichever order the two arrive in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDecision {
    grants: BTreeMap<ItemId, Option<Condition>>,
}

impl PermissionDecision {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one grant into the decision.
    ///
    /// Returns true if the decision changed.
    pub fn grant(&mut self, item: ItemId, condition: Option<Condition>) -> bool {
        let Some(condition) = condition else {
            if self.grants.contains_key(&item) {
                return false;
            }
            self.grants.insert(item, None);
            return true;
        };

        let slot = self.grants.entry(item).or_insert(None);
        if let Some(existing) = slot.as_mut() {
            existing.conjoin(&condition)
        } else {
            *slot = Some(condition);
            true
        }
    }

    pub fn is_granted(&self, item: &ItemId) -> bool {
        self.grants.contains_key(item)
    }

    /// Residual condition of a granted item, `None` if denied or unconditional.
    pub fn condition(&self, item: &ItemId) -> Option<&Condition> {
        self.grants.get(item).and_then(Option::as_ref)
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn items(&self) -> impl Iterator<Item = &ItemId> {
        self.grants.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ItemId, Option<&Condition>)> {
        self.grants.iter().map(|(item, cond)| (item, cond.as_ref()))
    }

    /// Grants every item unconditionally.
    pub fn grant_all<'a>(items: impl IntoIterator<Item = &'a ItemId>) -> Self {
        let mut decision = Self::new();
        for item in items {
            decision.grant(item.clone(), None);
        }
        decision
    }
}

// ============================================================================
// Ephemeral views
// ============================================================================

/// A named filtering view that lives for exactly one rewrite-execute cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EphemeralView {
    pub name: String,
    pub definition: String,
}

impl EphemeralView {
    pub fn new(name: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: definition.into(),
        }
    }

    pub fn create_sql(&self) -> String {
        format!("create view {} as {}", self.name, self.definition)
    }

    pub fn drop_sql(&self) -> String {
        format!("drop view if exists {}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn item(id: &str) -> ItemId {
        ItemId::from(id)
    }

    #[test]
    fn test_absent_item_is_denied() {
        let decision = PermissionDecision::new();
        assert!(!decision.is_granted(&item("l_quantity")));
        assert!(decision.is_empty());
    }

    #[test]
    fn test_conditions_conjoin_in_arrival_order() {
        let mut decision = PermissionDecision::new();
        assert!(decision.grant(item("l_tax"), Some(Condition::new("l_quantity > 10"))));
        assert!(decision.grant(item("l_tax"), Some(Condition::new("l_discount < 0.05"))));
        assert_eq!(
            decision.condition(&item("l_tax")).unwrap().predicate(),
            "l_quantity > 10 and l_discount < 0.05"
        );
    }

    #[test]
    fn test_duplicate_condition_not_conjoined_twice() {
        let mut decision = PermissionDecision::new();
        decision.grant(item("l_tax"), Some(Condition::new("l_quantity > 10")));
        assert!(!decision.grant(item("l_tax"), Some(Condition::new("l_quantity > 10"))));
        assert_eq!(decision.condition(&item("l_tax")).unwrap().conjuncts().len(), 1);
    }

    #[test]
    fn test_unconditional_grant_does_not_erase_condition() {
        let mut decision = PermissionDecision::new();
        decision.grant(item("o_orderdate"), Some(Condition::new("o_totalprice > 500")));
        assert!(!decision.grant(item("o_orderdate"), None));
        assert_eq!(
            decision.condition(&item("o_orderdate")).unwrap().predicate(),
            "o_totalprice > 500"
        );
    }

    #[test]
    fn test_condition_after_unconditional_grant_applies() {
        let mut decision = PermissionDecision::new();
        decision.grant(item("o_orderdate"), None);
        assert!(decision.grant(item("o_orderdate"), Some(Condition::new("o_totalprice > 500"))));
        assert!(decision.condition(&item("o_orderdate")).is_some());
    }

    #[test]
    fn test_condition_split_and_affinity() {
        let mut cond = Condition::new("c_acctbal > 100");
        cond.conjoin(&Condition::new("o_totalprice < 10"));
        let parts: Vec<_> = cond.split().collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].affinity(), Some(Table::Customer));
        assert_eq!(parts[1].affinity(), Some(Table::Orders));
    }

    #[test]
    fn test_view_sql() {
        let view = EphemeralView::new("veil_c1_v1", "select * from lineitem where l_tax > 0");
        assert_eq!(
            view.create_sql(),
            "create view veil_c1_v1 as select * from lineitem where l_tax > 0"
        );
        assert_eq!(view.drop_sql(), "drop view if exists veil_c1_v1");
    }

    proptest! {
        /// Whether the unconditional grant arrives first or last, the residual
        /// condition is the same conjunction.
        #[test]
        fn prop_merge_independent_of_unconditional_position(
            preds in proptest::collection::vec("[a-z]{1,6}", 1..5),
            position in 0usize..5,
        ) {
            let id = item("l_quantity");
            let mut with_uncond = PermissionDecision::new();
            let mut without = PermissionDecision::new();
            for (idx, pred) in preds.iter().enumerate() {
                if idx == position {
                    with_uncond.grant(id.clone(), None);
                }
                with_uncond.grant(id.clone(), Some(Condition::new(format!("l_{pred} > 1"))));
                without.grant(id.clone(), Some(Condition::new(format!("l_{pred} > 1"))));
            }
            if position >= preds.len() {
                with_uncond.grant(id.clone(), None);
            }
            prop_assert_eq!(with_uncond.condition(&id), without.condition(&id));
        }
    }
}
