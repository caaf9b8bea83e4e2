//! Groups residual conditions by the table they constrain.

use veil_types::{Condition, Table};

/// Conditions that constrain one table, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionGroup {
    pub table: Table,
    pub conditions: Vec<Condition>,
}

impl ConditionGroup {
    /// The group's conditions joined with `and`, each parenthesized when it
    /// contains a disjunction.
    pub fn conjunction(&self) -> String {
        self.conditions
            .iter()
            .map(|c| protect(&c.predicate()))
            .collect::<Vec<_>>()
            .join(" and ")
    }
}

/// Result of partitioning: one group per constrained table, plus conditions
/// whose table could not be determined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub groups: Vec<ConditionGroup>,
    pub unrouted: Vec<Condition>,
}

/// Partitions conditions by table affinity.
///
/// Groups follow [`Table`] declaration order; empty groups are omitted and
/// order within a group is preserved.
pub fn partition(conditions: &[Condition]) -> Partition {
    let mut out = Partition::default();
    let mut routed: Vec<(Table, Condition)> = Vec::new();
    for condition in conditions {
        match condition.affinity() {
            Some(table) => routed.push((table, condition.clone())),
            None => out.unrouted.push(condition.clone()),
        }
    }

    for table in Table::ALL {
        let conditions: Vec<Condition> = routed
            .iter()
            .filter(|(t, _)| *t == table)
            .map(|(_, c)| c.clone())
            .collect();
        if !conditions.is_empty() {
            out.groups.push(ConditionGroup { table, conditions });
        }
    }
    out
}

/// Wraps a predicate in parentheses if it contains a top-level `or`.
pub(crate) fn protect(predicate: &str) -> String {
    let lowered = predicate.to_ascii_lowercase();
    if lowered.contains(" or ") && !is_wrapped(predicate) {
        format!("({predicate})")
    } else {
        predicate.to_string()
    }
}

/// True if the outermost parentheses enclose the whole predicate.
fn is_wrapped(predicate: &str) -> bool {
    if !predicate.starts_with('(') || !predicate.ends_with(')') {
        return false;
    }
    let mut depth = 0usize;
    for (idx, ch) in predicate.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 && idx + 1 < predicate.len() {
                    return false;
                }
            }
            _ => {}
        }
    }
    true
}
