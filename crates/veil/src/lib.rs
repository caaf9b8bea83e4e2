//! # Veil
//!
//! Policy-driven query rewriting over the TPC-H workload.
//!
//! Veil decides, per query, which output items a subject may see under an
//! attribute-, role- or purpose-based policy, rewrites the query so that
//! denied items disappear and residual conditions restrict the rows, and
//! runs the result against a relational engine.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                              Veil                                │
//! │  ┌──────────┐   ┌───────────┐   ┌───────────┐   ┌─────────────┐  │
//! │  │ Resolver │ → │  Rewrite  │ → │   Views   │ → │  Execution  │  │
//! │  │(A/R/PBAC)│   │(prune+inj)│   │(ephemeral)│   │  (DuckDB)   │  │
//! │  └──────────┘   └───────────┘   └───────────┘   └─────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use veil::{Catalog, DuckDbEngine, PolicyCorpus, QueryCycle, build_resolver};
//! use veil::{AccessModel, ResolveContext};
//!
//! let corpus = PolicyCorpus::load("corpus.json".as_ref())?;
//! let resolver = build_resolver(AccessModel::Rbac, &corpus, true);
//! let engine = Arc::new(DuckDbEngine::open(Some("tpch.duckdb".as_ref()))?);
//!
//! let cycle = QueryCycle::new(engine, resolver, ResolveContext::new("Alice"));
//! let catalog = Catalog::tpch()?;
//! let report = cycle.run(catalog.get(QueryId::new(3)).unwrap()).await?;
//! ```
//!
//! # Modules
//!
//! - **Cycle**: [`QueryCycle`], [`CatalogRunner`] - resolve, rewrite, execute
//! - **Engines**: [`DuckDbEngine`], [`ScriptedEngine`]
//! - **Policies**: [`PolicyCorpus`], [`CorpusGenerator`], [`build_resolver`]
//! - **Metrics**: [`QueryMetrics`] and its sinks

pub mod corpus;
mod cycle;
pub mod engine;
mod error;
mod executor;
pub mod metrics;
mod resolver;
mod runner;
pub mod schema;
pub mod views;

// Cycle
pub use cycle::{
    CycleFailure, CycleReport, DEFAULT_EXECUTE_TIMEOUT, DEFAULT_LOOKUP_TIMEOUT, QueryCycle,
};
pub use executor::{ExecutionReport, execute};
pub use runner::{CatalogRunner, QueryOutcome, RunSummary};

// Errors
pub use error::{CorpusError, CycleError, MetricsError, Result, Stage};

// Engines
pub use engine::{DuckDbEngine, Engine, EngineError, Rows, ScriptedEngine, Session, Value};

// Policies
pub use corpus::{CorpusGenerator, PolicyCorpus, Scenario};
pub use resolver::{UnrestrictedResolver, build_resolver};

// Metrics
pub use metrics::{JsonLinesSink, MemorySink, MetricsSink, QueryMetrics, TracingSink};

// Re-export the query layer
pub use veil_query::{
    Catalog, FinalStatement, RewriteOutcome, StatementKind, StructuralClass, Suppression,
    ViewNamer, rewrite,
};

// Re-export core types
pub use veil_types::{
    AccessModel, Condition, CycleId, EphemeralView, ItemId, PermissionDecision, PolicyResolver,
    QueryId, ResolveContext,
};
