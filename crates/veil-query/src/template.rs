//! Structured statement representation for query templates.
//!
//! A template is held as clause lists rather than text. Every fragment
//! that depends on an output item carries a [`Guard`]; pruning removes
//! fragments whose guard fails, and rendering inserts separators, so a
//! rewritten statement never ends up with dangling commas or conjunctions.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use veil_types::{ItemId, PermissionDecision, QueryId, Table};

use crate::error::{Result, RewriteError, TemplateError};

/// Maps a supporting relation's template name to its name in the current
/// cycle. Clause text refers to a relation as `{name}`.
pub type RelationNames = BTreeMap<String, String>;

// ============================================================================
// Structural class
// ============================================================================

/// How residual conditions are injected into a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructuralClass {
    /// Single table, conditions go straight into WHERE.
    Simple,
    /// Several tables, each restricted through a filtering view.
    ViewBased,
    /// Result computed over a derived table that must be restricted.
    Nested,
    /// Create supporting relation; select; discard supporting relation.
    MultiStatement,
}

impl std::fmt::Display for StructuralClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StructuralClass::Simple => "simple",
            StructuralClass::ViewBased => "view-based",
            StructuralClass::Nested => "nested",
            StructuralClass::MultiStatement => "multi-statement",
        })
    }
}

// ============================================================================
// Guards
// ============================================================================

/// Which granted items a fragment depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Guard {
    /// Every one of these must be granted.
    requires: Vec<ItemId>,
    /// At least one of these must be granted, if any are listed.
    any_of: Vec<ItemId>,
}

impl Guard {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn requires(items: &[&str]) -> Self {
        Self {
            requires: items.iter().map(|i| ItemId::from(*i)).collect(),
            any_of: Vec::new(),
        }
    }

    pub fn any_of(items: &[&str]) -> Self {
        Self {
            requires: Vec::new(),
            any_of: items.iter().map(|i| ItemId::from(*i)).collect(),
        }
    }

    pub fn and_any_of(mut self, items: &[&str]) -> Self {
        self.any_of.extend(items.iter().map(|i| ItemId::from(*i)));
        self
    }

    pub fn is_unguarded(&self) -> bool {
        self.requires.is_empty() && self.any_of.is_empty()
    }

    pub fn allows(&self, decision: &PermissionDecision) -> bool {
        self.requires.iter().all(|item| decision.is_granted(item))
            && (self.any_of.is_empty() || self.any_of.iter().any(|item| decision.is_granted(item)))
    }

    pub fn mentions(&self, item: &ItemId) -> bool {
        self.items().any(|i| i == item)
    }

    pub fn items(&self) -> impl Iterator<Item = &ItemId> {
        self.requires.iter().chain(self.any_of.iter())
    }
}

// ============================================================================
// Fragments
// ============================================================================

/// One projection column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub expr: String,
    pub alias: Option<String>,
    pub guard: Guard,
}

impl Column {
    pub fn new(expr: &str) -> Self {
        Self {
            expr: expr.to_string(),
            alias: None,
            guard: Guard::none(),
        }
    }

    pub fn named(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn guarded(mut self, guard: Guard) -> Self {
        self.guard = guard;
        self
    }

    fn render(&self, names: &RelationNames) -> String {
        let expr = substitute(&self.expr, names);
        match &self.alias {
            Some(alias) => format!("{expr} as {alias}"),
            None => expr,
        }
    }
}

/// A predicate, grouping key, HAVING term or ordering key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub text: String,
    pub guard: Guard,
}

impl Clause {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            guard: Guard::none(),
        }
    }

    pub fn guarded(mut self, guard: Guard) -> Self {
        self.guard = guard;
        self
    }

    /// True if the clause text refers to the relation `{name}`.
    pub fn references_relation(&self, name: &str) -> bool {
        self.text.contains(&placeholder(name))
    }
}

impl From<&str> for Clause {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// A base table in a FROM list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub table: Table,
    pub alias: Option<String>,
    /// Filtering view substituted for the table during rewrite.
    pub view: Option<String>,
    pub guard: Guard,
}

impl TableRef {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            alias: None,
            view: None,
            guard: Guard::none(),
        }
    }

    pub fn aliased(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn guarded(mut self, guard: Guard) -> Self {
        self.guard = guard;
        self
    }

    fn render(&self) -> String {
        let name = self.view.as_deref().unwrap_or(self.table.name());
        match &self.alias {
            Some(alias) => format!("{name} {alias}"),
            None => name.to_string(),
        }
    }
}

/// One entry of a FROM list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Table(TableRef),
    Join {
        left: TableRef,
        kind: String,
        right: TableRef,
        on: String,
    },
    /// A subquery in FROM.
    Derived { body: Box<SelectBlock>, alias: String },
    /// A filtering view that replaced a derived table.
    View { name: String, alias: Option<String> },
    /// A supporting relation created by an earlier statement.
    Relation { name: String, guard: Guard },
}

impl Source {
    fn guard(&self) -> Option<&Guard> {
        match self {
            Source::Table(table) => Some(&table.guard),
            Source::Relation { guard, .. } => Some(guard),
            Source::Join { .. } | Source::Derived { .. } | Source::View { .. } => None,
        }
    }

    fn render(&self, names: &RelationNames) -> Result<String> {
        Ok(match self {
            Source::Table(table) => table.render(),
            Source::Join {
                left,
                kind,
                right,
                on,
            } => format!(
                "{} {kind} {} on {}",
                left.render(),
                right.render(),
                substitute(on, names)
            ),
            Source::Derived { body, alias } => format!("({}) as {alias}", body.render(names)?),
            Source::View { name, alias } => match alias {
                Some(alias) => format!("{name} as {alias}"),
                None => name.clone(),
            },
            Source::Relation { name, .. } => names.get(name).unwrap_or(name).clone(),
        })
    }
}

// ============================================================================
// Select block
// ============================================================================

/// One SELECT, clause by clause.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectBlock {
    pub projection: Vec<Column>,
    pub sources: Vec<Source>,
    pub predicates: Vec<Clause>,
    pub group_by: Vec<Clause>,
    pub having: Vec<Clause>,
    pub order_by: Vec<Clause>,
    pub limit: Option<u32>,
}

impl SelectBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(mut self, column: Column) -> Self {
        self.projection.push(column);
        self
    }

    pub fn from(mut self, source: Source) -> Self {
        self.sources.push(source);
        self
    }

    pub fn from_table(self, table: Table) -> Self {
        self.from(Source::Table(TableRef::new(table)))
    }

    pub fn filter(mut self, clause: impl Into<Clause>) -> Self {
        self.predicates.push(clause.into());
        self
    }

    pub fn group(mut self, clause: impl Into<Clause>) -> Self {
        self.group_by.push(clause.into());
        self
    }

    pub fn having(mut self, clause: impl Into<Clause>) -> Self {
        self.having.push(clause.into());
        self
    }

    pub fn order(mut self, clause: impl Into<Clause>) -> Self {
        self.order_by.push(clause.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Base tables referenced directly by this block (not inside subqueries).
    pub fn table_refs(&self) -> impl Iterator<Item = &TableRef> {
        self.sources.iter().flat_map(|source| match source {
            Source::Table(table) => vec![table],
            Source::Join { left, right, .. } => vec![left, right],
            _ => Vec::new(),
        })
    }

    pub fn table_refs_mut(&mut self) -> impl Iterator<Item = &mut TableRef> {
        self.sources.iter_mut().flat_map(|source| match source {
            Source::Table(table) => vec![table],
            Source::Join { left, right, .. } => vec![left, right],
            _ => Vec::new(),
        })
    }

    pub fn references(&self, table: Table) -> bool {
        self.table_refs().any(|r| r.table == table)
    }

    /// This block followed by every derived-table body beneath it.
    pub fn blocks(&self) -> Vec<&SelectBlock> {
        let mut out = vec![self];
        for source in &self.sources {
            if let Source::Derived { body, .. } = source {
                out.extend(body.blocks());
            }
        }
        out
    }

    /// Removes projection columns whose guard fails, at every depth.
    pub(crate) fn prune_projection(&mut self, decision: &PermissionDecision) {
        self.projection.retain(|col| col.guard.allows(decision));
        for source in &mut self.sources {
            if let Source::Derived { body, .. } = source {
                body.prune_projection(decision);
            }
        }
    }

    /// Removes every guarded non-projection fragment whose guard fails.
    pub(crate) fn repair_clauses(&mut self, decision: &PermissionDecision) {
        self.sources
            .retain(|source| source.guard().is_none_or(|guard| guard.allows(decision)));
        for list in [
            &mut self.predicates,
            &mut self.group_by,
            &mut self.having,
            &mut self.order_by,
        ] {
            list.retain(|clause| clause.guard.allows(decision));
        }
        for source in &mut self.sources {
            if let Source::Derived { body, .. } = source {
                body.repair_clauses(decision);
            }
        }
    }

    /// Drops blank fragments, stray conjunctions and duplicate predicates.
    pub(crate) fn tidy(&mut self) {
        for list in [
            &mut self.predicates,
            &mut self.group_by,
            &mut self.having,
            &mut self.order_by,
        ] {
            for clause in list.iter_mut() {
                clause.text = trim_separators(&clause.text);
            }
            list.retain(|clause| !clause.text.is_empty());
        }
        let mut seen = Vec::new();
        self.predicates.retain(|clause| {
            if seen.contains(&clause.text) {
                false
            } else {
                seen.push(clause.text.clone());
                true
            }
        });
        for source in &mut self.sources {
            if let Source::Derived { body, .. } = source {
                body.tidy();
            }
        }
    }

    /// Renders the block as SQL.
    ///
    /// Fails if the projection or FROM list is empty.
    pub fn render(&self, names: &RelationNames) -> Result<String> {
        if self.projection.is_empty() {
            return Err(RewriteError::MissingClause { clause: "select" });
        }
        if self.sources.is_empty() {
            return Err(RewriteError::MissingClause { clause: "from" });
        }

        let columns: Vec<String> = self.projection.iter().map(|c| c.render(names)).collect();
        let sources = self
            .sources
            .iter()
            .map(|s| s.render(names))
            .collect::<Result<Vec<_>>>()?;

        let mut sql = format!("select {} from {}", columns.join(", "), sources.join(", "));
        push_clauses(&mut sql, " where ", &self.predicates, " and ", names);
        push_clauses(&mut sql, " group by ", &self.group_by, ", ", names);
        push_clauses(&mut sql, " having ", &self.having, " and ", names);
        push_clauses(&mut sql, " order by ", &self.order_by, ", ", names);
        if let Some(limit) = self.limit {
            let _ = write!(sql, " limit {limit}");
        }
        Ok(sql)
    }
}

fn push_clauses(
    sql: &mut String,
    keyword: &str,
    clauses: &[Clause],
    separator: &str,
    names: &RelationNames,
) {
    if clauses.is_empty() {
        return;
    }
    sql.push_str(keyword);
    let rendered: Vec<String> = clauses.iter().map(|c| substitute(&c.text, names)).collect();
    sql.push_str(&rendered.join(separator));
}

fn placeholder(name: &str) -> String {
    format!("{{{name}}}")
}

fn substitute(text: &str, names: &RelationNames) -> String {
    let mut out = text.to_string();
    for (name, actual) in names {
        out = out.replace(&placeholder(name), actual);
    }
    out
}

/// Trims whitespace and leading or trailing `and`/`,` separators.
fn trim_separators(text: &str) -> String {
    let mut s = text.trim();
    loop {
        let before = s;
        for sep in [",", "and ", "AND "] {
            if let Some(rest) = s.strip_prefix(sep) {
                s = rest.trim_start();
            }
        }
        for sep in [",", " and", " AND"] {
            if let Some(rest) = s.strip_suffix(sep) {
                s = rest.trim_end();
            }
        }
        if s == before {
            return s.to_string();
        }
    }
}

// ============================================================================
// Statements and templates
// ============================================================================

/// One statement of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Produces the query result.
    Select(SelectBlock),
    /// Creates a supporting relation consumed by a later statement.
    CreateRelation { name: String, body: SelectBlock },
    /// Discards a supporting relation.
    DropRelation { name: String },
}

impl Statement {
    pub fn block(&self) -> Option<&SelectBlock> {
        match self {
            Statement::Select(block) | Statement::CreateRelation { body: block, .. } => Some(block),
            Statement::DropRelation { .. } => None,
        }
    }

    pub fn block_mut(&mut self) -> Option<&mut SelectBlock> {
        match self {
            Statement::Select(block) | Statement::CreateRelation { body: block, .. } => Some(block),
            Statement::DropRelation { .. } => None,
        }
    }

    pub fn render(&self, names: &RelationNames) -> Result<String> {
        match self {
            Statement::Select(block) => block.render(names),
            Statement::CreateRelation { name, body } => Ok(format!(
                "create view {} as {}",
                names.get(name).unwrap_or(name),
                body.render(names)?
            )),
            Statement::DropRelation { name } => {
                Ok(format!("drop view {}", names.get(name).unwrap_or(name)))
            }
        }
    }
}

/// One selectable column or aggregate of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputItem {
    pub id: ItemId,
    /// Projection fragments governed by this item, as written in the query.
    pub source_text: String,
    pub table_affinity: Option<Table>,
}

/// An immutable, validated query template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    id: QueryId,
    class: StructuralClass,
    items: Vec<OutputItem>,
    statements: Vec<Statement>,
    raw_text: String,
}

impl QueryTemplate {
    /// Builds and validates a template.
    ///
    /// Every guard must reference a declared item and every declared item
    /// must govern at least one projection column.
    pub fn new(
        id: u32,
        class: StructuralClass,
        item_ids: &[&str],
        statements: Vec<Statement>,
    ) -> std::result::Result<Self, TemplateError> {
        let id = QueryId::new(id);
        let declared: Vec<ItemId> = item_ids.iter().map(|i| ItemId::from(*i)).collect();
        for (idx, item) in declared.iter().enumerate() {
            if declared[..idx].contains(item) {
                return Err(TemplateError::DuplicateItem {
                    query: id,
                    item: item.clone(),
                });
            }
        }
        if !statements.iter().any(|s| matches!(s, Statement::Select(_))) {
            return Err(TemplateError::NoResultStatement { query: id });
        }

        let blocks: Vec<&SelectBlock> = statements
            .iter()
            .filter_map(Statement::block)
            .flat_map(SelectBlock::blocks)
            .collect();

        for guard in blocks.iter().flat_map(|b| block_guards(b)) {
            if let Some(item) = guard.items().find(|i| !declared.contains(i)) {
                return Err(TemplateError::UndeclaredItem {
                    query: id,
                    item: item.clone(),
                });
            }
        }

        let identity: RelationNames = statements
            .iter()
            .filter_map(|s| match s {
                Statement::CreateRelation { name, .. } => Some((name.clone(), name.clone())),
                _ => None,
            })
            .collect();

        let mut items = Vec::with_capacity(declared.len());
        for item in declared {
            let governed: Vec<String> = blocks
                .iter()
                .flat_map(|b| b.projection.iter())
                .filter(|col| col.guard.mentions(&item))
                .map(|col| col.render(&identity))
                .collect();
            if governed.is_empty() {
                return Err(TemplateError::UngovernedItem { query: id, item });
            }
            items.push(OutputItem {
                table_affinity: item.affinity(),
                source_text: governed.join(", "),
                id: item,
            });
        }

        let raw_text = statements
            .iter()
            .map(|s| s.render(&identity))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| TemplateError::Unrenderable {
                query: id,
                reason: e.to_string(),
            })?
            .join("; ");

        Ok(Self {
            id,
            class,
            items,
            statements,
            raw_text,
        })
    }

    pub fn id(&self) -> QueryId {
        self.id
    }

    pub fn class(&self) -> StructuralClass {
        self.class
    }

    pub fn output_items(&self) -> &[OutputItem] {
        &self.items
    }

    pub fn item_ids(&self) -> Vec<ItemId> {
        self.items.iter().map(|i| i.id.clone()).collect()
    }

    pub fn declares(&self, item: &ItemId) -> bool {
        self.items.iter().any(|i| &i.id == item)
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// The unrestricted statements joined with `; `.
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }
}

fn block_guards(block: &SelectBlock) -> Vec<&Guard> {
    let mut guards: Vec<&Guard> = block.projection.iter().map(|c| &c.guard).collect();
    guards.extend(block.sources.iter().filter_map(Source::guard));
    guards.extend(
        [
            &block.predicates,
            &block.group_by,
            &block.having,
            &block.order_by,
        ]
        .into_iter()
        .flatten()
        .map(|c| &c.guard),
    );
    guards
}
