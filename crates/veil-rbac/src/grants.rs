//! Grant rows and the merge rule shared by role- and purpose-based resolution.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use veil_types::{Condition, ItemId, PermissionDecision, PolicyLookupError, ResolveStats};

/// One `(item, condition)` pair returned by a policy store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRow {
    pub item: ItemId,
    pub condition: Option<String>,
}

impl GrantRow {
    pub fn new(item: impl Into<ItemId>, condition: Option<&str>) -> Self {
        Self {
            item: item.into(),
            condition: condition.map(str::to_string),
        }
    }
}

/// Merges store rows into `decision`, keeping only candidate items.
///
/// Rows are applied in the order given. Every row that changes the decision
/// counts as an applied rule. Rows for items outside `candidates` are
/// ignored.
pub fn merge_rows(
    store: &'static str,
    rows: &[GrantRow],
    candidates: &[ItemId],
    decision: &mut PermissionDecision,
    stats: &mut ResolveStats,
) -> Result<(), PolicyLookupError> {
    let wanted: HashSet<&ItemId> = candidates.iter().collect();

    for row in rows {
        validate_row(store, row)?;
        if !wanted.contains(&row.item) {
            continue;
        }
        let condition = row.condition.as_deref().map(Condition::new);
        if decision.grant(row.item.clone(), condition) {
            stats.record_applied();
        }
    }
    Ok(())
}

fn validate_row(store: &'static str, row: &GrantRow) -> Result<(), PolicyLookupError> {
    if row.item.as_str().trim().is_empty() {
        return Err(PolicyLookupError::MalformedRow {
            store,
            reason: "grant row without an item id".to_string(),
        });
    }
    if row
        .condition
        .as_deref()
        .is_some_and(|condition| condition.trim().is_empty())
    {
        return Err(PolicyLookupError::MalformedRow {
            store,
            reason: format!("blank condition for item '{}'", row.item),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(items: &[&str]) -> Vec<ItemId> {
        items.iter().map(|i| ItemId::from(*i)).collect()
    }

    #[test]
    fn test_non_candidates_are_ignored() {
        let rows = vec![
            GrantRow::new("l_tax", None),
            GrantRow::new("c_name", Some("c_acctbal > 0")),
        ];
        let mut decision = PermissionDecision::new();
        let mut stats = ResolveStats::default();
        merge_rows("role", &rows, &ids(&["l_tax"]), &mut decision, &mut stats).unwrap();
        assert_eq!(decision.len(), 1);
        assert_eq!(stats.applied_rules, 1);
    }

    #[test]
    fn test_blank_condition_is_malformed() {
        let rows = vec![GrantRow::new("l_tax", Some("  "))];
        let err = merge_rows(
            "role",
            &rows,
            &ids(&["l_tax"]),
            &mut PermissionDecision::new(),
            &mut ResolveStats::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PolicyLookupError::MalformedRow { .. }));
    }

    #[test]
    fn test_missing_item_is_malformed() {
        let rows = vec![GrantRow::new("", None)];
        let err = merge_rows(
            "purpose",
            &rows,
            &[],
            &mut PermissionDecision::new(),
            &mut ResolveStats::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PolicyLookupError::MalformedRow { store: "purpose", .. }));
    }

    proptest! {
        /// Reordering unconditional rows among conditioned ones never changes
        /// the residual condition.
        #[test]
        fn prop_unconditional_rows_are_order_insensitive(
            conds in proptest::collection::vec(0u8..6, 1..6),
            unconditional in 1usize..4,
        ) {
            let conditioned: Vec<GrantRow> = conds
                .iter()
                .map(|n| GrantRow::new("l_tax", Some(format!("l_quantity > {n}").as_str())))
                .collect();
            let plain = vec![GrantRow::new("l_tax", None); unconditional];

            let mut first = plain.clone();
            first.extend(conditioned.iter().cloned());
            let mut last = conditioned.clone();
            last.extend(plain);

            let candidates = ids(&["l_tax"]);
            let mut a = PermissionDecision::new();
            let mut b = PermissionDecision::new();
            merge_rows("role", &first, &candidates, &mut a, &mut ResolveStats::default()).unwrap();
            merge_rows("role", &last, &candidates, &mut b, &mut ResolveStats::default()).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
