//! Relational engine adapters.
//!
//! A cycle only needs three things from an engine: run a statement, run a
//! query and collect its rows, and tell whether a relation name is taken.
//! Each cycle opens its own [`Session`]; sessions are never shared.

use serde::Serialize;
use thiserror::Error;

mod duckdb;
mod scripted;

pub use self::duckdb::DuckDbEngine;
pub use self::scripted::ScriptedEngine;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The engine rejected a connection or a statement.
///
/// The engine's own error is carried unmodified as the source.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{engine}: failed to open session: {source}")]
    Connect {
        engine: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("statement failed: {source}\n  {sql}")]
    Statement {
        sql: String,
        #[source]
        source: BoxError,
    },
}

impl EngineError {
    pub(crate) fn statement(sql: &str, source: impl Into<BoxError>) -> Self {
        EngineError::Statement {
            sql: sql.to_string(),
            source: source.into(),
        }
    }
}

/// A relational engine that hands out independent sessions.
pub trait Engine: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn connect(&self) -> Result<Box<dyn Session>, EngineError>;
}

/// One connection to an engine.
pub trait Session: Send {
    /// Runs a statement that returns no rows.
    fn execute(&mut self, sql: &str) -> Result<(), EngineError>;

    /// Runs a query and collects every row.
    fn query(&mut self, sql: &str) -> Result<Rows, EngineError>;

    /// Whether a table or view named `name` exists.
    fn relation_exists(&mut self, name: &str) -> Result<bool, EngineError>;
}

/// A single result value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    /// Days since the Unix epoch.
    Date(i32),
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r:.2}"),
            Value::Text(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{d}"),
        }
    }
}

/// Rows returned by a query, with their column names.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Rows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Rows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
