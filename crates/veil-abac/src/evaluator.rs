//! ABAC resolution.
//!
//! For every candidate item the resolver collects the item's rules and checks
//! three inclusions in order: subject, environment, object. A failed
//! environment check revokes an item the subject check would have granted.
//! Object requirements that are predicates become residual conditions.

use tracing::{debug, info, warn};
use veil_types::{
    AccessModel, Condition, ItemId, PermissionDecision, PolicyLookupError, PolicyResolver,
    ResolveContext, ResolveStats, Resolution,
};

use crate::attributes::{AttributeSet, is_predicate};
use crate::policy::AbacRule;
use crate::store::AttributeStore;

const STORE: &str = "attribute";

// ============================================================================
// Verdict
// ============================================================================

/// Outcome of evaluating one item's rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// No rule mentions the item.
    NoRules,
    /// A subject requirement is missing from the subject's attributes.
    SubjectMismatch,
    /// An environment requirement is missing from the environment.
    EnvironmentMismatch,
    /// An object requirement is missing from the item's attributes.
    ObjectMismatch,
    /// Granted; one entry per rule, `Some` for predicate requirements.
    Granted(Vec<Option<Condition>>),
}

/// Evaluates the rules of one item against the three attribute sets.
pub fn evaluate_item(
    rules: &[AbacRule],
    subject: &AttributeSet,
    environment: &AttributeSet,
    object: &AttributeSet,
) -> Verdict {
    if rules.is_empty() {
        return Verdict::NoRules;
    }
    if !subject.satisfies(rules.iter().map(|r| r.subject_attribute.as_str())) {
        return Verdict::SubjectMismatch;
    }
    if !environment.satisfies(rules.iter().map(|r| r.environment_attribute.as_str())) {
        return Verdict::EnvironmentMismatch;
    }
    if !object.satisfies(rules.iter().map(|r| r.object_attribute.as_str())) {
        return Verdict::ObjectMismatch;
    }

    Verdict::Granted(
        rules
            .iter()
            .map(|rule| {
                is_predicate(&rule.object_attribute)
                    .then(|| Condition::new(rule.object_attribute.as_str()))
            })
            .collect(),
    )
}

// ============================================================================
// Resolver
// ============================================================================

/// Attribute-based [`PolicyResolver`].
#[derive(Debug)]
pub struct AttributeResolver<S> {
    store: S,
    audit_enabled: bool,
}

impl<S: AttributeStore> AttributeResolver<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            audit_enabled: true,
        }
    }

    /// Disables decision logging (for testing).
    pub fn without_audit(mut self) -> Self {
        self.audit_enabled = false;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn subject_attributes(
        &self,
        subject: &str,
        stats: &mut ResolveStats,
    ) -> Result<AttributeSet, PolicyLookupError> {
        stats.record_lookup();
        let attrs = self.store.subject_attributes(subject)?;
        if attrs.is_empty() {
            // A subject without assignments is its own sole attribute.
            return Ok(std::iter::once(subject).collect());
        }
        Ok(attrs.into_iter().collect())
    }
}

impl<S: AttributeStore> PolicyResolver for AttributeResolver<S> {
    fn model(&self) -> AccessModel {
        AccessModel::Abac
    }

    fn resolve(
        &self,
        candidates: &[ItemId],
        context: &ResolveContext,
    ) -> Result<Resolution, PolicyLookupError> {
        let mut stats = ResolveStats::default();
        let mut decision = PermissionDecision::new();

        let subject = self.subject_attributes(&context.subject, &mut stats)?;
        let environment: AttributeSet = context.environment.iter().map(String::as_str).collect();

        for item in candidates {
            stats.record_lookup();
            let object: AttributeSet = self.store.object_attributes(item)?.into_iter().collect();
            stats.record_lookup();
            let rules = self.store.rules_for(item)?;
            validate_rules(item, &rules)?;

            match evaluate_item(&rules, &subject, &environment, &object) {
                Verdict::Granted(grants) => {
                    for condition in grants {
                        if decision.grant(item.clone(), condition) {
                            stats.record_applied();
                        }
                    }
                    if self.audit_enabled {
                        info!(
                            subject = %context.subject,
                            item = %item,
                            condition = ?decision.condition(item).map(Condition::predicate),
                            "Item granted by attribute policy"
                        );
                    }
                }
                verdict => {
                    if self.audit_enabled {
                        warn!(
                            subject = %context.subject,
                            item = %item,
                            reason = ?verdict,
                            "Item denied by attribute policy"
                        );
                    }
                }
            }
        }

        debug!(
            granted = decision.len(),
            lookups = stats.lookups,
            applied = stats.applied_rules,
            "Attribute resolution complete"
        );
        Ok(Resolution { decision, stats })
    }
}

fn validate_rules(item: &ItemId, rules: &[AbacRule]) -> Result<(), PolicyLookupError> {
    for rule in rules {
        if rule.item.as_str().trim().is_empty() || &rule.item != item {
            return Err(PolicyLookupError::MalformedRow {
                store: STORE,
                reason: format!("rule for '{}' returned for item '{item}'", rule.item),
            });
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
