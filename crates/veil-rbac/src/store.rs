//! Role and purpose policy stores.

use std::collections::BTreeMap;
use std::fmt::Debug;

use serde::{Deserialize, Deserializer, Serialize};
use veil_types::{ItemId, PolicyLookupError};

use crate::grants::GrantRow;

// ============================================================================
// Store traits
// ============================================================================

/// Read-only lookups against a role policy store.
pub trait RoleStore: Send + Sync + Debug {
    /// Roles assigned to a subject.
    fn roles_of(&self, subject: &str) -> Result<Vec<String>, PolicyLookupError>;

    /// Grant rows keyed by any of `roles`, in store order.
    fn grants_for_roles(&self, roles: &[String]) -> Result<Vec<GrantRow>, PolicyLookupError>;
}

/// Read-only lookups against a purpose policy store.
pub trait PurposeStore: Send + Sync + Debug {
    /// Grant rows keyed by `purpose`, in store order.
    fn grants_for_purpose(&self, purpose: &str) -> Result<Vec<GrantRow>, PolicyLookupError>;
}

// ============================================================================
// Stored rules
// ============================================================================

/// Grants an item to a role, optionally under a condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role: String,
    pub item: ItemId,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub condition: Option<String>,
}

impl RoleGrant {
    pub fn new(role: &str, item: &str, condition: Option<&str>) -> Self {
        Self {
            role: role.to_string(),
            item: ItemId::from(item),
            condition: condition.map(str::to_string),
        }
    }
}

/// Grants an item for a purpose, optionally under a condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurposeGrant {
    pub purpose: String,
    pub item: ItemId,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub condition: Option<String>,
}

impl PurposeGrant {
    pub fn new(purpose: &str, item: &str, condition: Option<&str>) -> Self {
        Self {
            purpose: purpose.to_string(),
            item: ItemId::from(item),
            condition: condition.map(str::to_string),
        }
    }
}

/// Serialized corpora write "no condition" as an empty string.
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.trim().is_empty()))
}

// ============================================================================
// In-memory stores
// ============================================================================

/// Role store held in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryRoleStore {
    /// Subject -> roles.
    #[serde(default)]
    pub assignments: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub grants: Vec<RoleGrant>,
}

impl InMemoryRoleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(mut self, subject: &str, role: &str) -> Self {
        self.assignments
            .entry(subject.to_string())
            .or_default()
            .push(role.to_string());
        self
    }

    pub fn with_grant(mut self, grant: RoleGrant) -> Self {
        self.grants.push(grant);
        self
    }
}

impl RoleStore for InMemoryRoleStore {
    fn roles_of(&self, subject: &str) -> Result<Vec<String>, PolicyLookupError> {
        Ok(self.assignments.get(subject).cloned().unwrap_or_default())
    }

    fn grants_for_roles(&self, roles: &[String]) -> Result<Vec<GrantRow>, PolicyLookupError> {
        Ok(self
            .grants
            .iter()
            .filter(|grant| roles.contains(&grant.role))
            .map(|grant| GrantRow {
                item: grant.item.clone(),
                condition: grant.condition.clone(),
            })
            .collect())
    }
}

/// Purpose store held in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryPurposeStore {
    #[serde(default)]
    pub grants: Vec<PurposeGrant>,
}

impl InMemoryPurposeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_grant(mut self, grant: PurposeGrant) -> Self {
        self.grants.push(grant);
        self
    }
}

impl PurposeStore for InMemoryPurposeStore {
    fn grants_for_purpose(&self, purpose: &str) -> Result<Vec<GrantRow>, PolicyLookupError> {
        Ok(self
            .grants
            .iter()
            .filter(|grant| grant.purpose == purpose)
            .map(|grant| GrantRow {
                item: grant.item.clone(),
                condition: grant.condition.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_condition_deserializes_as_none() {
        let json = r#"{"role": "CEO", "item": "l_tax", "condition": ""}"#;
        let grant: RoleGrant = serde_json::from_str(json).unwrap();
        assert_eq!(grant.condition, None);

        let json = r#"{"purpose": "audit", "item": "l_tax"}"#;
        let grant: PurposeGrant = serde_json::from_str(json).unwrap();
        assert_eq!(grant.condition, None);
    }

    #[test]
    fn test_grants_for_roles_unions_roles() {
        let store = InMemoryRoleStore::new()
            .with_grant(RoleGrant::new("CEO", "l_tax", None))
            .with_grant(RoleGrant::new("CFO", "l_discount", Some("l_discount < 0.1")))
            .with_grant(RoleGrant::new("intern", "l_comment", None));
        let rows = store
            .grants_for_roles(&["CEO".to_string(), "CFO".to_string()])
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].condition.as_deref(), Some("l_discount < 0.1"));
    }

    #[test]
    fn test_grants_for_purpose_filters_by_purpose() {
        let store = InMemoryPurposeStore::new()
            .with_grant(PurposeGrant::new("billing", "o_totalprice", None))
            .with_grant(PurposeGrant::new("marketing", "c_name", None));
        let rows = store.grants_for_purpose("billing").unwrap();
        assert_eq!(rows, vec![GrantRow::new("o_totalprice", None)]);
    }
}
