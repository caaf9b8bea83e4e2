//! # veil-types: Core types for `Veil`
//!
//! This crate contains shared types used across the `Veil` workspace:
//! - Identifiers ([`ItemId`], [`QueryId`], [`CycleId`])
//! - Schema tables and column affinity ([`Table`])
//! - Access model selection ([`AccessModel`])
//! - Permission decisions ([`PermissionDecision`], [`Condition`])
//! - Ephemeral views ([`EphemeralView`])
//! - Policy resolution ([`PolicyResolver`], [`ResolveContext`], [`Resolution`],
//!   [`ResolveStats`], [`PolicyLookupError`])

use std::{
    fmt::{Debug, Display},
    str::FromStr,
    sync::{
        OnceLock,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

mod decision;

pub use decision::{Condition, EphemeralView, PermissionDecision};

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of one output item (a selectable column or aggregate).
///
/// Unique within its query template, e.g. `sum(l_extendedprice)` or
/// `count(lineitem)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The table this item draws from, derived from its leading column
    /// prefix or a table name used as an argument.
    pub fn affinity(&self) -> Option<Table> {
        Table::affinity_of(&self.0)
    }
}

impl Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of a query template in the catalog (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueryId(u32);

impl QueryId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl Display for QueryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Q{}", self.0)
    }
}

impl From<u32> for QueryId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<QueryId> for u32 {
    fn from(id: QueryId) -> Self {
        id.0
    }
}

static NEXT_CYCLE: AtomicU64 = AtomicU64::new(1);
static PROCESS_SALT: OnceLock<u64> = OnceLock::new();

/// High 32 bits of every cycle id allocated by this process.
///
/// Mixes the pid with the start time so a later process never reuses the
/// view names a crashed one may have left in a file-backed database.
fn process_salt() -> u64 {
    *PROCESS_SALT.get_or_init(|| {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        ((secs & 0xFFFF) << 48) | ((u64::from(std::process::id()) & 0xFFFF) << 32)
    })
}

/// Identifier of one rewrite-execute cycle.
///
/// Ephemeral view names are scoped by this id, so concurrent cycles never
/// contend for a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CycleId(u64);

impl CycleId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates a cycle id unique to this process run.
    ///
    /// The low 32 bits count cycles; the high bits are a per-process salt.
    pub fn next() -> Self {
        let seq = NEXT_CYCLE.fetch_add(1, Ordering::Relaxed) & 0xFFFF_FFFF;
        Self(process_salt() | seq)
    }
}

impl Display for CycleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<CycleId> for u64 {
    fn from(id: CycleId) -> Self {
        id.0
    }
}

// ============================================================================
// Schema
// ============================================================================

/// The eight tables of the benchmark schema.
///
/// Declaration order is the order in which condition groups are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Supplier,
    Part,
    PartSupp,
    Customer,
    Orders,
    Lineitem,
    Nation,
    Region,
}

impl Table {
    pub const ALL: [Table; 8] = [
        Table::Supplier,
        Table::Part,
        Table::PartSupp,
        Table::Customer,
        Table::Orders,
        Table::Lineitem,
        Table::Nation,
        Table::Region,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::Supplier => "supplier",
            Table::Part => "part",
            Table::PartSupp => "partsupp",
            Table::Customer => "customer",
            Table::Orders => "orders",
            Table::Lineitem => "lineitem",
            Table::Nation => "nation",
            Table::Region => "region",
        }
    }

    /// Column name prefix, including the underscore.
    pub fn column_prefix(self) -> &'static str {
        match self {
            Table::Supplier => "s_",
            Table::Part => "p_",
            Table::PartSupp => "ps_",
            Table::Customer => "c_",
            Table::Orders => "o_",
            Table::Lineitem => "l_",
            Table::Nation => "n_",
            Table::Region => "r_",
        }
    }

    pub fn from_name(name: &str) -> Option<Table> {
        Table::ALL
            .into_iter()
            .find(|table| table.name().eq_ignore_ascii_case(name))
    }

    /// Maps a (possibly qualified) column name to its table by prefix.
    ///
    /// `n1.n_name` and `n_name` both map to [`Table::Nation`].
    pub fn from_column(column: &str) -> Option<Table> {
        let bare = column.rsplit('.').next().unwrap_or(column);
        let (prefix, rest) = bare.split_once('_')?;
        if rest.is_empty() {
            return None;
        }
        Table::ALL.into_iter().find(|table| {
            let expected = table.column_prefix();
            expected[..expected.len() - 1].eq_ignore_ascii_case(prefix)
        })
    }

    /// Finds the table a SQL fragment leads with.
    ///
    /// Scans identifiers left to right, skipping quoted literals, and returns
    /// the first one that is either a table name or a prefixed column.
    pub fn affinity_of(fragment: &str) -> Option<Table> {
        identifiers(fragment)
            .find_map(|ident| Table::from_name(ident).or_else(|| Table::from_column(ident)))
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Iterates over the bare identifiers of a SQL fragment outside quotes.
fn identifiers(fragment: &str) -> impl Iterator<Item = &str> {
    let bytes = fragment.as_bytes();
    let mut idx = 0;
    let mut in_quote = false;
    std::iter::from_fn(move || {
        while idx < bytes.len() {
            let b = bytes[idx];
            if b == b'\'' {
                in_quote = !in_quote;
                idx += 1;
                continue;
            }
            if in_quote || !(b.is_ascii_alphabetic() || b == b'_') {
                idx += 1;
                continue;
            }
            let start = idx;
            while idx < bytes.len() && (bytes[idx].is_ascii_alphanumeric() || bytes[idx] == b'_') {
                idx += 1;
            }
            return Some(&fragment[start..idx]);
        }
        None
    })
}

// ============================================================================
// Access model
// ============================================================================

/// Which access-control model a resolver enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccessModel {
    /// Attribute-based access control.
    #[default]
    Abac,
    /// Role-based access control.
    Rbac,
    /// Purpose-based access control.
    Pbac,
    /// No access control; every item granted unconditionally.
    Unrestricted,
}

impl AccessModel {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessModel::Abac => "abac",
            AccessModel::Rbac => "rbac",
            AccessModel::Pbac => "pbac",
            AccessModel::Unrestricted => "unrestricted",
        }
    }
}

impl Display for AccessModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abac" => Ok(AccessModel::Abac),
            "rbac" => Ok(AccessModel::Rbac),
            "pbac" => Ok(AccessModel::Pbac),
            "unrestricted" | "none" => Ok(AccessModel::Unrestricted),
            other => Err(format!(
                "unknown access model '{other}' (expected abac, rbac, pbac or unrestricted)"
            )),
        }
    }
}

// ============================================================================
// Policy resolution
// ============================================================================

/// Who is asking, why, and under which circumstances.
///
/// The subject is supplied by the caller and is not authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveContext {
    pub subject: String,
    pub purpose: String,
    pub environment: Vec<String>,
}

impl ResolveContext {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            purpose: String::new(),
            environment: Vec::new(),
        }
    }

    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = purpose.into();
        self
    }

    pub fn with_environment<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.environment = attributes.into_iter().map(Into::into).collect();
        self
    }
}

/// Counters reported by a resolver for one resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveStats {
    /// Policy-store lookups performed.
    pub lookups: u32,
    /// Policy rules that changed the decision.
    pub applied_rules: u32,
}

impl ResolveStats {
    pub fn record_lookup(&mut self) {
        self.lookups += 1;
    }

    pub fn record_applied(&mut self) {
        self.applied_rules += 1;
    }
}

/// A permission decision together with the counters that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub decision: PermissionDecision,
    pub stats: ResolveStats,
}

/// Resolves which output items a subject may see.
///
/// Each implementation enforces exactly one [`AccessModel`], fixed when it is
/// constructed. Resolution fails safe: when no policy matches, the decision
/// is empty and the query is suppressed.
pub trait PolicyResolver: Send + Sync + Debug {
    fn model(&self) -> AccessModel;

    /// Resolves the permission decision for `candidates`.
    ///
    /// The returned decision only ever contains ids from `candidates`.
    fn resolve(
        &self,
        candidates: &[ItemId],
        context: &ResolveContext,
    ) -> Result<Resolution, PolicyLookupError>;
}

/// Error returned when the policy store cannot answer a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyLookupError {
    /// The store could not be reached.
    Unavailable { store: &'static str, reason: String },
    /// The store returned a row that cannot be interpreted.
    MalformedRow { store: &'static str, reason: String },
}

impl Display for PolicyLookupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable { store, reason } => {
                write!(f, "{store} policy store unavailable: {reason}")
            }
            Self::MalformedRow { store, reason } => {
                write!(f, "malformed row from {store} policy store: {reason}")
            }
        }
    }
}

impl std::error::Error for PolicyLookupError {}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("l_quantity", Some(Table::Lineitem))]
    #[test_case("ps_supplycost", Some(Table::PartSupp))]
    #[test_case("p_partkey", Some(Table::Part))]
    #[test_case("n1.n_name", Some(Table::Nation))]
    #[test_case("r_name", Some(Table::Region))]
    #[test_case("revenue", None)]
    #[test_case("l_", None)]
    fn test_from_column(column: &str, expected: Option<Table>) {
        assert_eq!(Table::from_column(column), expected);
    }

    #[test_case("sum(l_extendedprice)", Some(Table::Lineitem))]
    #[test_case("count(lineitem)", Some(Table::Lineitem))]
    #[test_case("count(distinct ps_suppkey)", Some(Table::PartSupp))]
    #[test_case("o_orderdate between '1995-01-01' and '1996-12-31'", Some(Table::Orders))]
    #[test_case("'c_name' = s_name", Some(Table::Supplier))]
    #[test_case("count(*)", None)]
    fn test_affinity_of(fragment: &str, expected: Option<Table>) {
        assert_eq!(Table::affinity_of(fragment), expected);
    }

    #[test]
    fn test_item_affinity() {
        assert_eq!(ItemId::from("avg(l_discount)").affinity(), Some(Table::Lineitem));
        assert_eq!(ItemId::from("count(nation)").affinity(), Some(Table::Nation));
    }

    #[test]
    fn test_access_model_parse() {
        assert_eq!("RBAC".parse::<AccessModel>(), Ok(AccessModel::Rbac));
        assert_eq!("none".parse::<AccessModel>(), Ok(AccessModel::Unrestricted));
        assert!("xacml".parse::<AccessModel>().is_err());
    }

    #[test]
    fn test_access_model_serde() {
        let json = serde_json::to_string(&AccessModel::Pbac).unwrap();
        assert_eq!(json, "\"pbac\"");
        let back: AccessModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AccessModel::Pbac);
    }

    #[test]
    fn test_cycle_ids_are_unique() {
        let a = CycleId::next();
        let b = CycleId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_cycle_ids_carry_process_salt() {
        let a = u64::from(CycleId::next());
        let b = u64::from(CycleId::next());
        assert_eq!(a >> 32, process_salt() >> 32);
        assert_eq!(b >> 32, a >> 32);
        assert_ne!(a & 0xFFFF_FFFF, b & 0xFFFF_FFFF);
    }

    #[test]
    fn test_query_id_display() {
        assert_eq!(QueryId::new(15).to_string(), "Q15");
    }

    #[test]
    fn test_resolve_context_builder() {
        let ctx = ResolveContext::new("Alice")
            .with_purpose("audit")
            .with_environment(["morning", "hp laptop"]);
        assert_eq!(ctx.subject, "Alice");
        assert_eq!(ctx.purpose, "audit");
        assert_eq!(ctx.environment, vec!["morning", "hp laptop"]);
    }
}
