//! # veil-query: query catalog and rewrite engine
//!
//! Holds the 22 TPC-H templates as structured statements and rewrites them
//! under a [`PermissionDecision`](veil_types::PermissionDecision).
//!
//! ## Structural classes
//!
//! - `Simple`: one table; residual conditions go into WHERE
//! - `ViewBased`: each constrained table is swapped for a filtering view
//! - `Nested`: the derived table is restricted and replaced by a view
//! - `MultiStatement`: conditions are routed to the statement that first
//!   references their table; supporting relations get cycle-scoped names
//!
//! ## Usage
//!
//! ```
//! use veil_query::{Catalog, ViewNamer, rewrite};
//! use veil_types::{Condition, CycleId, ItemId, PermissionDecision, QueryId};
//!
//! let catalog = Catalog::tpch().unwrap();
//! let q6 = catalog.get(QueryId::new(6)).unwrap();
//!
//! let mut decision = PermissionDecision::grant_all(&q6.item_ids());
//! decision.grant(ItemId::from("sum(l_discount)"), Some(Condition::new("l_quantity > 10")));
//!
//! let outcome = rewrite(q6, &decision, &mut ViewNamer::new(CycleId::new(1)));
//! assert!(outcome.final_statements[0].sql.contains("where l_quantity > 10 and l_shipdate"));
//! ```

pub mod catalog;
mod error;
pub mod naming;
pub mod partition;
pub mod rewrite;
pub mod template;


pub use catalog::Catalog;
pub use error::{Result, RewriteError, TemplateError};
pub use naming::ViewNamer;
pub use partition::{ConditionGroup, Partition, partition};
pub use rewrite::{FinalStatement, RewriteOutcome, StatementKind, Suppression, rewrite};
pub use template::{OutputItem, QueryTemplate, StructuralClass};
