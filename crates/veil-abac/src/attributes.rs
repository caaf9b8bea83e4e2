//! Attribute sets for ABAC evaluation.
//!
//! Subjects, objects (output items) and the environment each carry a flat
//! set of string attributes. Rules match by set inclusion.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Attribute Set
// ============================================================================

/// An unordered set of attribute strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeSet(BTreeSet<String>);

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, attribute: impl Into<String>) {
        self.0.insert(attribute.into());
    }

    pub fn contains(&self, attribute: &str) -> bool {
        self.0.contains(attribute)
    }

    /// True if every non-empty requirement is in this set.
    ///
    /// An empty requirement string places no constraint.
    pub fn satisfies<'a>(&self, requirements: impl IntoIterator<Item = &'a str>) -> bool {
        requirements
            .into_iter()
            .filter(|req| !req.is_empty())
            .all(|req| self.0.contains(req))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

// ============================================================================
// Environment Attributes
// ============================================================================

/// Attributes describing when and where the request is made.
pub struct EnvironmentAttributes;

impl EnvironmentAttributes {
    /// Derives environment attributes from a timestamp.
    ///
    /// Produces the calendar date as `M/D/YYYY` and the part of day
    /// (`morning` 05:00-12:00, `afternoon` 12:00-17:00, `evening`
    /// 17:00-21:00, `night` otherwise), followed by any `extra` attributes
    /// such as the device or security level.
    pub fn observed_at<I, S>(ts: DateTime<Utc>, extra: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let day_part = match ts.hour() {
            5..=11 => "morning",
            12..=16 => "afternoon",
            17..=20 => "evening",
            _ => "night",
        };
        let mut attrs = vec![
            format!("{}/{}/{}", ts.month(), ts.day(), ts.year()),
            day_part.to_string(),
        ];
        attrs.extend(extra.into_iter().map(Into::into));
        attrs
    }
}

// ============================================================================
// Predicates
// ============================================================================

/// True if an object attribute is a row predicate rather than a label.
///
/// Comparison operators and `between` mark a predicate; such an attribute
/// becomes the residual condition of the item it grants.
pub fn is_predicate(attribute: &str) -> bool {
    attribute.contains('<')
        || attribute.contains('>')
        || attribute.contains('=')
        || attribute.to_ascii_lowercase().contains(" between ")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn test_satisfies_subset() {
        let attrs: AttributeSet = ["CEO", "finance"].into_iter().collect();
        assert!(attrs.satisfies(["CEO"]));
        assert!(attrs.satisfies(["CEO", "finance"]));
        assert!(!attrs.satisfies(["CEO", "legal"]));
    }

    #[test]
    fn test_empty_requirement_is_unconstrained() {
        let attrs = AttributeSet::new();
        assert!(attrs.satisfies([""]));
        assert!(attrs.satisfies(std::iter::empty::<&str>()));
    }

    #[test]
    fn test_predicate_detection() {
        assert!(is_predicate("l_quantity > 10"));
        assert!(is_predicate("o_orderstatus != 'F'"));
        assert!(is_predicate("c_acctbal <= 100"));
        assert!(is_predicate("l_shipdate between '1993-01-01' and '1996-01-01'"));
        assert!(!is_predicate("admin owner"));
        assert!(!is_predicate("any"));
    }

    #[test]
    fn test_observed_at_morning() {
        let ts = Utc.with_ymd_and_hms(2020, 5, 20, 9, 30, 0).unwrap();
        let env = EnvironmentAttributes::observed_at(ts, ["security 1", "hp laptop"]);
        assert_eq!(env, vec!["5/20/2020", "morning", "security 1", "hp laptop"]);
    }

    #[test]
    fn test_observed_at_night_boundary() {
        let ts = Utc.with_ymd_and_hms(2020, 5, 20, 21, 0, 0).unwrap();
        let env = EnvironmentAttributes::observed_at(ts, Vec::<String>::new());
        assert_eq!(env[1], "night");
    }

    proptest! {
        #[test]
        fn prop_observed_at_leads_with_date_and_day_part(secs in 0i64..4_102_444_800) {
            let ts = Utc.timestamp_opt(secs, 0).unwrap();
            let env = EnvironmentAttributes::observed_at(ts, ["security 1"]);
            prop_assert_eq!(env.len(), 3);
            prop_assert_eq!(env[0].matches('/').count(), 2);
            prop_assert!(["morning", "afternoon", "evening", "night"].contains(&env[1].as_str()));
            prop_assert_eq!(env[2].as_str(), "security 1");
        }
    }
}
