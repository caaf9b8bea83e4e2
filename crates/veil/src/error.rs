//! Error types for query cycles, metrics sinks and policy corpora.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use veil_types::PolicyLookupError;

use crate::engine::EngineError;

/// Which bounded stage of a cycle ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Lookup,
    Execute,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Lookup => f.write_str("policy lookup"),
            Stage::Execute => f.write_str("execution"),
        }
    }
}

/// A query cycle failed. Every variant is scoped to one query.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    PolicyLookup(#[from] PolicyLookupError),

    #[error("view '{name}' already exists")]
    ViewConflict { name: String },

    #[error(transparent)]
    Execution(#[from] EngineError),

    #[error("{stage} exceeded its budget of {budget:?}")]
    Timeout { stage: Stage, budget: Duration },

    #[error("worker failed: {0}")]
    Worker(String),

    #[error("cycle abandoned after its deadline")]
    Abandoned,
}

impl CycleError {
    /// Short label used in metrics records.
    pub fn kind(&self) -> &'static str {
        match self {
            CycleError::PolicyLookup(_) => "policy_lookup",
            CycleError::ViewConflict { .. } => "view_conflict",
            CycleError::Execution(_) => "execution",
            CycleError::Timeout { .. } => "timeout",
            CycleError::Worker(_) => "worker",
            CycleError::Abandoned => "abandoned",
        }
    }
}

pub type Result<T> = std::result::Result<T, CycleError>;

/// A metrics record could not be written.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to write metrics: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode metrics: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A policy corpus file could not be read or written.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("corpus file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corpus file {path} is not a valid corpus: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
