//! # veil-rbac: Role- and Purpose-Based Access Control
//!
//! Two resolvers that share one grant-merge rule:
//! - **Role-based** ([`RoleResolver`]): the subject's roles select grant rules
//! - **Purpose-based** ([`PurposeResolver`]): the declared purpose selects grant rules
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Candidate items + ResolveContext            │
//! └─────────────────┬───────────────────────────┘
//!                   │
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  RoleResolver / PurposeResolver              │
//! │  ├─ roles of subject / declared purpose      │
//! │  ├─ grant rows for those keys                │
//! │  └─ merge rows per item (conjoin conditions) │
//! └─────────────────┬───────────────────────────┘
//!                   │
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  PermissionDecision                          │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Merge rule
//!
//! When several rules grant the same item, their conditions are conjoined in
//! store order. An unconditional rule never removes a condition contributed
//! by another rule.
//!
//! ## Examples
//!
//! ```
//! use veil_rbac::{InMemoryRoleStore, RoleGrant, RoleResolver};
//! use veil_types::{ItemId, PolicyResolver, ResolveContext};
//!
//! let store = InMemoryRoleStore::new()
//!     .assign("Alice", "CEO")
//!     .with_grant(RoleGrant::new("CEO", "o_orderdate", Some("o_totalprice > 1000")))
//!     .with_grant(RoleGrant::new("CEO", "o_orderdate", None));
//!
//! let resolver = RoleResolver::new(store).without_audit();
//! let res = resolver
//!     .resolve(&[ItemId::from("o_orderdate")], &ResolveContext::new("Alice"))
//!     .unwrap();
//!
//! let cond = res.decision.condition(&ItemId::from("o_orderdate")).unwrap();
//! assert_eq!(cond.predicate(), "o_totalprice > 1000");
//! ```

pub mod grants;
pub mod purpose;
pub mod roles;
pub mod store;

pub use grants::{GrantRow, merge_rows};
pub use purpose::PurposeResolver;
pub use roles::RoleResolver;
pub use store::{
    InMemoryPurposeStore, InMemoryRoleStore, PurposeGrant, PurposeStore, RoleGrant, RoleStore,
};
