//! Policy-driven query rewriting.
//!
//! Turns a template and a permission decision into the statements to run:
//!
//! 1. Prune projection columns governed by denied items
//! 2. Suppress if nothing is left to select
//! 3. Remove secondary clauses that depend on denied items
//! 4. Inject residual conditions, dispatched on [`StructuralClass`]
//! 5. Tidy, render and parse-check every statement
//!
//! Any inconsistency found along the way suppresses the template instead of
//! running a statement whose restriction cannot be vouched for.

use std::collections::BTreeMap;

use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use tracing::{debug, warn};
use veil_types::{Condition, EphemeralView, PermissionDecision, Table};

use crate::error::{Result, RewriteError};
use crate::naming::ViewNamer;
use crate::partition::{partition, protect};
use crate::template::{
    Clause, QueryTemplate, RelationNames, SelectBlock, Source, Statement, StructuralClass,
};

// ============================================================================
// Outcome
// ============================================================================

/// What a final statement does to the engine's catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    /// Returns rows.
    Query,
    /// Creates the named supporting relation.
    CreateRelation(String),
    /// Drops the named supporting relation.
    DropRelation(String),
}

/// A rendered statement ready for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalStatement {
    pub sql: String,
    pub kind: StatementKind,
}

/// Why a template was not rewritten into runnable statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suppression {
    /// The decision grants nothing.
    DeniedAll,
    /// Every projection column of the result statement was pruned.
    EmptyProjection,
    /// The rewrite failed an integrity check.
    Integrity(RewriteError),
}

impl std::fmt::Display for Suppression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Suppression::DeniedAll => f.write_str("no item granted"),
            Suppression::EmptyProjection => f.write_str("no projection column survived pruning"),
            Suppression::Integrity(err) => write!(f, "integrity failure: {err}"),
        }
    }
}

/// Result of rewriting one template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub final_statements: Vec<FinalStatement>,
    /// Filtering views to create, in order, before the final statements run.
    pub supporting_views: Vec<EphemeralView>,
    pub suppression: Option<Suppression>,
}

impl RewriteOutcome {
    fn suppressed(reason: Suppression) -> Self {
        Self {
            suppression: Some(reason),
            ..Self::default()
        }
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppression.is_some()
    }
}

// ============================================================================
// Entry point
// ============================================================================

/// Rewrites `template` under `decision`.
///
/// View and relation names are drawn from `namer`, so the same template,
/// decision and cycle always produce the same output.
pub fn rewrite(
    template: &QueryTemplate,
    decision: &PermissionDecision,
    namer: &mut ViewNamer,
) -> RewriteOutcome {
    if let Some(item) = decision.items().find(|item| !template.declares(item)) {
        let err = RewriteError::UnknownItem {
            query: template.id(),
            item: item.clone(),
        };
        warn!(query = %template.id(), error = %err, "Rewrite suppressed");
        return RewriteOutcome::suppressed(Suppression::Integrity(err));
    }
    if decision.is_empty() {
        debug!(query = %template.id(), "No item granted");
        return RewriteOutcome::suppressed(Suppression::DeniedAll);
    }

    match plan(template, decision, namer) {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(
                query = %template.id(),
                cycle = %namer.cycle(),
                error = %err,
                "Rewrite suppressed"
            );
            RewriteOutcome::suppressed(Suppression::Integrity(err))
        }
    }
}

fn plan(
    template: &QueryTemplate,
    decision: &PermissionDecision,
    namer: &mut ViewNamer,
) -> Result<RewriteOutcome> {
    let mut statements = template.statements().to_vec();

    for block in statements.iter_mut().filter_map(Statement::block_mut) {
        block.prune_projection(decision);
    }
    let result_is_empty = statements
        .iter()
        .find_map(|s| match s {
            Statement::Select(block) => Some(block),
            _ => None,
        })
        .is_none_or(|block| block.projection.is_empty());
    if result_is_empty {
        debug!(query = %template.id(), "Projection pruned away");
        return Ok(RewriteOutcome::suppressed(Suppression::EmptyProjection));
    }

    for block in statements.iter_mut().filter_map(Statement::block_mut) {
        block.repair_clauses(decision);
    }

    let conditions = collect_conditions(template, decision)?;
    let mut views = Vec::new();
    let mut names = RelationNames::new();

    match template.class() {
        StructuralClass::Simple => {
            let block = result_block(&mut statements)?;
            inject_where(block, &conditions)?;
        }
        StructuralClass::ViewBased => {
            let block = result_block(&mut statements)?;
            inject_views(block, &conditions, namer, &mut views)?;
        }
        StructuralClass::Nested => {
            let block = result_block(&mut statements)?;
            inject_nested(block, &conditions, namer, &mut views)?;
        }
        StructuralClass::MultiStatement => {
            names = inject_multi(&mut statements, &conditions, namer, &mut views)?;
        }
    }

    for block in statements.iter_mut().filter_map(Statement::block_mut) {
        block.tidy();
    }

    for view in &views {
        parse_check(&view.create_sql())?;
    }
    let mut final_statements = Vec::with_capacity(statements.len());
    for statement in &statements {
        let sql = statement.render(&names)?;
        parse_check(&sql)?;
        let kind = match statement {
            Statement::Select(_) => StatementKind::Query,
            Statement::CreateRelation { name, .. } => {
                StatementKind::CreateRelation(actual_name(&names, name))
            }
            Statement::DropRelation { name } => {
                StatementKind::DropRelation(actual_name(&names, name))
            }
        };
        final_statements.push(FinalStatement { sql, kind });
    }

    debug!(
        query = %template.id(),
        conditions = conditions.len(),
        views = views.len(),
        statements = final_statements.len(),
        "Rewrite complete"
    );
    Ok(RewriteOutcome {
        final_statements,
        supporting_views: views,
        suppression: None,
    })
}

/// Residual conditions of granted items, split into single conjuncts, in
/// template item order with duplicates dropped.
fn collect_conditions(
    template: &QueryTemplate,
    decision: &PermissionDecision,
) -> Result<Vec<Condition>> {
    let mut out: Vec<Condition> = Vec::new();
    for item in template.output_items() {
        let Some(condition) = decision.condition(&item.id) else {
            continue;
        };
        for conjunct in condition.split() {
            if conjunct.is_blank() {
                return Err(RewriteError::BlankCondition);
            }
            if !out.contains(&conjunct) {
                out.push(conjunct);
            }
        }
    }
    Ok(out)
}

fn result_block(statements: &mut [Statement]) -> Result<&mut SelectBlock> {
    statements
        .iter_mut()
        .find_map(|s| match s {
            Statement::Select(block) => Some(block),
            _ => None,
        })
        .ok_or(RewriteError::MissingClause { clause: "select" })
}

fn actual_name(names: &RelationNames, name: &str) -> String {
    names.get(name).cloned().unwrap_or_else(|| name.to_string())
}

fn parse_check(sql: &str) -> Result<()> {
    Parser::parse_sql(&GenericDialect {}, sql)
        .map(|_| ())
        .map_err(|e| RewriteError::Malformed {
            reason: e.to_string(),
        })
}

// ============================================================================
// Injection strategies
// ============================================================================

/// Conjoins conditions at the front of the block's WHERE clause.
///
/// A table referenced under an alias has its columns qualified with the
/// first alias it appears under.
fn inject_where(block: &mut SelectBlock, conditions: &[Condition]) -> Result<()> {
    let mut injected = Vec::with_capacity(conditions.len());
    for condition in conditions {
        let table = affinity(condition)?;
        let target = block
            .table_refs()
            .find(|r| r.table == table)
            .ok_or(RewriteError::TableNotInScope { table })?;
        let predicate = protect(&condition.predicate());
        let text = match &target.alias {
            Some(alias) => qualify(&predicate, table, alias),
            None => predicate,
        };
        injected.push(Clause::new(text));
    }
    block.predicates.splice(0..0, injected);
    Ok(())
}

/// Routes each table's conditions through one filtering view.
fn inject_views(
    block: &mut SelectBlock,
    conditions: &[Condition],
    namer: &mut ViewNamer,
    views: &mut Vec<EphemeralView>,
) -> Result<()> {
    let parts = partition(conditions);
    if let Some(condition) = parts.unrouted.first() {
        return Err(RewriteError::UnroutableCondition {
            predicate: condition.predicate(),
        });
    }
    for group in &parts.groups {
        if !block.references(group.table) {
            return Err(RewriteError::TableNotInScope { table: group.table });
        }
        let name = namer.next_view();
        let definition = format!(
            "select * from {} where {}",
            group.table.name(),
            group.conjunction()
        );
        for table_ref in block.table_refs_mut().filter(|r| r.table == group.table) {
            table_ref.view = Some(name.clone());
        }
        views.push(EphemeralView::new(name, definition));
    }
    Ok(())
}

/// Restricts the first derived table and replaces it with a view.
fn inject_nested(
    block: &mut SelectBlock,
    conditions: &[Condition],
    namer: &mut ViewNamer,
    views: &mut Vec<EphemeralView>,
) -> Result<()> {
    let source = block
        .sources
        .iter_mut()
        .find(|s| matches!(s, Source::Derived { .. }))
        .ok_or(RewriteError::MissingSubquery)?;
    if conditions.is_empty() {
        return Ok(());
    }
    let Source::Derived { body, alias } = source else {
        return Err(RewriteError::MissingSubquery);
    };

    inject_where(body, conditions)?;
    body.tidy();
    let definition = body.render(&RelationNames::new())?;
    let alias = alias.clone();
    let name = namer.next_view();
    *source = Source::View {
        name: name.clone(),
        alias: Some(alias),
    };
    views.push(EphemeralView::new(name, definition));
    Ok(())
}

/// Handles `create relation; select; drop relation` templates.
///
/// Returns the cycle-scoped names of the surviving supporting relations.
fn inject_multi(
    statements: &mut Vec<Statement>,
    conditions: &[Condition],
    namer: &mut ViewNamer,
    views: &mut Vec<EphemeralView>,
) -> Result<RelationNames> {
    let emptied: Vec<String> = statements
        .iter()
        .filter_map(|s| match s {
            Statement::CreateRelation { name, body } if body.projection.is_empty() => {
                Some(name.clone())
            }
            _ => None,
        })
        .collect();
    for name in &emptied {
        debug!(relation = %name, "Supporting relation pruned away");
        statements.retain(|s| match s {
            Statement::CreateRelation { name: n, .. } | Statement::DropRelation { name: n } => {
                n != name
            }
            Statement::Select(_) => true,
        });
        for block in statements.iter_mut().filter_map(Statement::block_mut) {
            forget_relation(block, name);
        }
    }

    let names: RelationNames = statements
        .iter()
        .filter_map(|s| match s {
            Statement::CreateRelation { name, .. } => Some((name.clone(), namer.relation(name))),
            _ => None,
        })
        .collect();

    let mut routed: BTreeMap<usize, Vec<Condition>> = BTreeMap::new();
    for condition in conditions {
        let table = affinity(condition)?;
        let idx = statements
            .iter()
            .position(|s| s.block().is_some_and(|b| b.references(table)))
            .ok_or(RewriteError::TableNotInScope { table })?;
        routed.entry(idx).or_default().push(condition.clone());
    }
    for (idx, conditions) in routed {
        let Some(block) = statements.get_mut(idx).and_then(Statement::block_mut) else {
            continue;
        };
        if block.table_refs().count() == 1 {
            inject_where(block, &conditions)?;
        } else {
            inject_views(block, &conditions, namer, views)?;
        }
    }
    Ok(names)
}

/// Removes every FROM entry and clause that mentions relation `name`.
fn forget_relation(block: &mut SelectBlock, name: &str) {
    block
        .sources
        .retain(|s| !matches!(s, Source::Relation { name: n, .. } if n == name));
    for list in [
        &mut block.predicates,
        &mut block.group_by,
        &mut block.having,
        &mut block.order_by,
    ] {
        list.retain(|clause| !clause.references_relation(name));
    }
}

fn affinity(condition: &Condition) -> Result<Table> {
    condition
        .affinity()
        .ok_or_else(|| RewriteError::UnroutableCondition {
            predicate: condition.predicate(),
        })
}

/// Prefixes unqualified columns of `table` with `alias`, skipping quoted
/// literals.
fn qualify(predicate: &str, table: Table, alias: &str) -> String {
    let mut out = String::with_capacity(predicate.len() + 8);
    let mut chars = predicate.char_indices().peekable();
    let mut in_quote = false;
    let mut prev: Option<char> = None;

    while let Some((start, ch)) = chars.next() {
        if ch == '\'' {
            in_quote = !in_quote;
        }
        if in_quote || !(ch.is_ascii_alphabetic() || ch == '_') {
            out.push(ch);
            prev = Some(ch);
            continue;
        }
        let mut end = start + ch.len_utf8();
        while let Some(&(idx, next)) = chars.peek() {
            if next.is_ascii_alphanumeric() || next == '_' {
                end = idx + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        let ident = &predicate[start..end];
        let qualified = prev.is_none_or(|p| p != '.' && !p.is_ascii_alphanumeric() && p != '_')
            && Table::from_column(ident) == Some(table);
        if qualified {
            out.push_str(alias);
            out.push('.');
        }
        out.push_str(ident);
        prev = ident.chars().last();
    }
    out
}
