//! # veil-abac: Attribute-Based Access Control
//!
//! Decides which output items of a query a subject may see by matching
//! subject, environment and object attributes against attribute rules.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Candidate items + ResolveContext            │
//! │  (subject, environment attributes)           │
//! └─────────────────┬───────────────────────────┘
//!                   │
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  AttributeResolver                           │
//! │  ├─ subject requirements ⊆ subject attrs     │
//! │  ├─ environment requirements ⊆ environment   │
//! │  ├─ object requirements ⊆ object attrs       │
//! │  └─ predicate objects become conditions      │
//! └─────────────────┬───────────────────────────┘
//!                   │
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  PermissionDecision                          │
//! │  item -> optional residual condition         │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Examples
//!
//! ```
//! use veil_abac::{AbacRule, AttributeResolver, InMemoryAttributeStore};
//! use veil_types::{ItemId, PolicyResolver, ResolveContext};
//!
//! let store = InMemoryAttributeStore::new()
//!     .assign_subject("Alice", ["CEO"])
//!     .assign_object("l_tax", ["admin owner", "l_quantity > 10"])
//!     .with_rule(AbacRule::new("l_tax", "CEO", "l_quantity > 10", "morning"));
//!
//! let resolver = AttributeResolver::new(store).without_audit();
//! let ctx = ResolveContext::new("Alice").with_environment(["morning"]);
//! let resolution = resolver.resolve(&[ItemId::from("l_tax")], &ctx).unwrap();
//!
//! let condition = resolution.decision.condition(&ItemId::from("l_tax")).unwrap();
//! assert_eq!(condition.predicate(), "l_quantity > 10");
//! ```

pub mod attributes;
pub mod evaluator;
pub mod policy;
pub mod store;

pub use attributes::{AttributeSet, EnvironmentAttributes, is_predicate};
pub use evaluator::{AttributeResolver, Verdict, evaluate_item};
pub use policy::AbacRule;
pub use store::{AttributeStore, InMemoryAttributeStore};
