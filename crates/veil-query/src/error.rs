//! Error types for the catalog and rewrite engine.

use thiserror::Error;
use veil_types::{ItemId, QueryId, Table};

/// A template in the catalog is internally inconsistent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("{query}: duplicate output item '{item}'")]
    DuplicateItem { query: QueryId, item: ItemId },

    #[error("{query}: guard references undeclared item '{item}'")]
    UndeclaredItem { query: QueryId, item: ItemId },

    #[error("{query}: output item '{item}' governs no projection column")]
    UngovernedItem { query: QueryId, item: ItemId },

    #[error("{query}: no statement produces a result")]
    NoResultStatement { query: QueryId },

    #[error("{query}: template does not render: {reason}")]
    Unrenderable { query: QueryId, reason: String },
}

/// The rewrite could not produce a statement it can vouch for.
///
/// Every variant causes the template to be suppressed rather than run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewriteError {
    #[error("decision grants '{item}' which is not an output item of {query}")]
    UnknownItem { query: QueryId, item: ItemId },

    #[error("condition '{predicate}' has no table affinity")]
    UnroutableCondition { predicate: String },

    #[error("condition on {table} but {table} is not referenced where it must be injected")]
    TableNotInScope { table: Table },

    #[error("nested template has no derived table to restrict")]
    MissingSubquery,

    #[error("blank residual condition")]
    BlankCondition,

    #[error("statement lost its {clause} clause")]
    MissingClause { clause: &'static str },

    #[error("rewritten statement does not parse: {reason}")]
    Malformed { reason: String },
}

pub type Result<T> = std::result::Result<T, RewriteError>;
