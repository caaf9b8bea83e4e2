//! Attribute policy store.

use std::collections::BTreeMap;
use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use veil_types::{ItemId, PolicyLookupError};

use crate::policy::AbacRule;

/// Read-only lookups against an attribute policy store.
///
/// Each method is one store lookup; the resolver counts calls.
pub trait AttributeStore: Send + Sync + Debug {
    /// Attributes assigned to a subject. Empty if the subject is unknown.
    fn subject_attributes(&self, subject: &str) -> Result<Vec<String>, PolicyLookupError>;

    /// Attributes assigned to an output item.
    fn object_attributes(&self, item: &ItemId) -> Result<Vec<String>, PolicyLookupError>;

    /// Rules keyed by an output item, in store order.
    fn rules_for(&self, item: &ItemId) -> Result<Vec<AbacRule>, PolicyLookupError>;
}

/// Attribute store held in memory, loadable from a policy corpus file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryAttributeStore {
    #[serde(default)]
    pub subjects: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub objects: BTreeMap<ItemId, Vec<String>>,
    #[serde(default)]
    pub rules: Vec<AbacRule>,
}

impl InMemoryAttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign_subject<I, S>(mut self, subject: &str, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subjects
            .entry(subject.to_string())
            .or_default()
            .extend(attributes.into_iter().map(Into::into));
        self
    }

    pub fn assign_object<I, S>(mut self, item: &str, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.objects
            .entry(ItemId::from(item))
            .or_default()
            .extend(attributes.into_iter().map(Into::into));
        self
    }

    pub fn with_rule(mut self, rule: AbacRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl AttributeStore for InMemoryAttributeStore {
    fn subject_attributes(&self, subject: &str) -> Result<Vec<String>, PolicyLookupError> {
        Ok(self.subjects.get(subject).cloned().unwrap_or_default())
    }

    fn object_attributes(&self, item: &ItemId) -> Result<Vec<String>, PolicyLookupError> {
        Ok(self.objects.get(item).cloned().unwrap_or_default())
    }

    fn rules_for(&self, item: &ItemId) -> Result<Vec<AbacRule>, PolicyLookupError> {
        Ok(self
            .rules
            .iter()
            .filter(|rule| &rule.item == item)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_for_keeps_store_order() {
        let store = InMemoryAttributeStore::new()
            .with_rule(AbacRule::new("l_tax", "CEO", "l_quantity > 10", ""))
            .with_rule(AbacRule::new("l_discount", "CEO", "admin owner", ""))
            .with_rule(AbacRule::new("l_tax", "CFO", "l_tax < 0.05", ""));

        let rules = store.rules_for(&ItemId::from("l_tax")).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].subject_attribute, "CEO");
        assert_eq!(rules[1].subject_attribute, "CFO");
    }

    #[test]
    fn test_unknown_subject_has_no_attributes() {
        let store = InMemoryAttributeStore::new();
        assert!(store.subject_attributes("Mallory").unwrap().is_empty());
    }

    #[test]
    fn test_store_deserializes_from_json() {
        let json = r#"{
            "subjects": {"Alice": ["CEO"]},
            "objects": {"l_tax": ["admin owner"]},
            "rules": [{"item": "l_tax", "subject_attribute": "CEO", "object_attribute": "admin owner"}]
        }"#;
        let store: InMemoryAttributeStore = serde_json::from_str(json).unwrap();
        assert_eq!(store.rule_count(), 1);
        assert_eq!(store.rules[0].environment_attribute, "");
    }
}
