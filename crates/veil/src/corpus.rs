//! Policy corpora: loading, saving and synthetic generation.
//!
//! A corpus holds the attribute, role and purpose stores side by side, so
//! one file can drive a run under any access model.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;
use veil_abac::{AbacRule, InMemoryAttributeStore};
use veil_query::Catalog;
use veil_rbac::{InMemoryPurposeStore, InMemoryRoleStore, PurposeGrant, RoleGrant};
use veil_types::{ItemId, Table};

use crate::error::CorpusError;

/// Policies for all three access models.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyCorpus {
    #[serde(default)]
    pub abac: InMemoryAttributeStore,
    #[serde(default)]
    pub rbac: InMemoryRoleStore,
    #[serde(default)]
    pub pbac: InMemoryPurposeStore,
}

impl PolicyCorpus {
    pub fn load(path: &Path) -> Result<Self, CorpusError> {
        let text = fs::read_to_string(path).map_err(|source| CorpusError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| CorpusError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), CorpusError> {
        let text = serde_json::to_string_pretty(self).map_err(|source| CorpusError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, text).map_err(|source| CorpusError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Rule counts as `(abac, rbac, pbac)`.
    pub fn rule_counts(&self) -> (usize, usize, usize) {
        (
            self.abac.rule_count(),
            self.rbac.grants.len(),
            self.pbac.grants.len(),
        )
    }
}

// ============================================================================
// Generator
// ============================================================================

/// Coverage of the generated policies over the catalog's output items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// No policy grants anything to the subject.
    NoMatch,
    /// Two items per query are granted, with conditions.
    Partial,
    /// Every item is granted, each under at least one condition.
    AllConditioned,
    /// Every item is granted without conditions.
    AllUnconditioned,
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::NoMatch,
        Scenario::Partial,
        Scenario::AllConditioned,
        Scenario::AllUnconditioned,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Scenario::NoMatch => "no-match",
            Scenario::Partial => "partial",
            Scenario::AllConditioned => "all-conditioned",
            Scenario::AllUnconditioned => "all-unconditioned",
        }
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scenario::ALL
            .into_iter()
            .find(|scenario| scenario.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!(
                    "unknown scenario '{s}' (expected no-match, partial, all-conditioned or all-unconditioned)"
                )
            })
    }
}

/// Residual conditions a generated grant may carry, per table.
fn condition_pool(table: Table) -> &'static [&'static str] {
    match table {
        Table::Supplier => &[
            "s_suppkey > 100",
            "s_suppkey < 10000",
            "s_nationkey > 5",
            "s_nationkey < 20",
            "s_acctbal > 10",
            "s_acctbal < 5000",
        ],
        Table::Part => &[
            "p_partkey >= 1000",
            "p_partkey <= 10000",
            "p_size > 10",
            "p_size < 40",
            "p_retailprice > 1000",
            "p_retailprice < 1600",
            "p_type = 'PROMO BURNISHED COPPER'",
            "p_type = 'LARGE BRUSHED BRASS'",
            "p_type = 'SMALL PLATED COPPER'",
            "p_container = 'WRAP CASE'",
            "p_container = 'MED BAG'",
            "p_container = 'JUMBO BOX'",
        ],
        Table::PartSupp => &[
            "ps_partkey >= 100",
            "ps_partkey <= 1000",
            "ps_suppkey > 100",
            "ps_suppkey < 10000",
            "ps_availqty > 1000",
            "ps_availqty < 7000",
            "ps_supplycost >= 100",
            "ps_supplycost <= 700",
        ],
        Table::Customer => &[
            "c_custkey > 100",
            "c_custkey < 10000",
            "c_nationkey > 5",
            "c_nationkey < 15",
            "c_acctbal > 10",
            "c_acctbal < 2000",
            "c_mktsegment = 'BUILDING'",
            "c_mktsegment = 'AUTOMOBILE'",
            "c_mktsegment = 'MACHINERY'",
        ],
        Table::Orders => &[
            "o_orderkey > 100",
            "o_orderkey < 10000",
            "o_custkey > 100",
            "o_custkey < 5000",
            "o_orderstatus = 'O'",
            "o_totalprice < 100000",
            "o_orderdate between date '1993-01-01' and date '1996-01-01'",
            "o_orderpriority = '2-HIGH'",
        ],
        Table::Lineitem => &[
            "l_orderkey > 100",
            "l_orderkey < 10000",
            "l_suppkey > 100",
            "l_partkey >= 1000",
            "l_linenumber = 1",
            "l_quantity > 10",
            "l_extendedprice > 10000",
            "l_discount > 0.06",
            "l_tax <> 0",
            "l_returnflag = 'N'",
            "l_linestatus = 'F'",
            "l_shipdate between date '1993-01-01' and date '1996-01-01'",
            "l_shipinstruct <> 'NONE'",
            "l_shipmode = 'MAIL'",
            "l_shipmode = 'TRUCK'",
        ],
        Table::Nation => &[
            "n_nationkey > 5",
            "n_nationkey < 20",
            "n_regionkey >= 3",
            "n_regionkey < 3",
        ],
        Table::Region => &[],
    }
}

/// Object attribute carried by unconditional ABAC rules.
const OWNER_ATTRIBUTE: &str = "admin owner";
/// Item that noise policies target; no template selects it.
const NOISE_ITEM: &str = "l_comment";

/// Seeded generator of policy corpora for every access model at once.
///
/// The subject, role, purpose and environment attributes match the default
/// run configuration, so a generated corpus resolves as its scenario says.
#[derive(Debug, Clone)]
pub struct CorpusGenerator {
    seed: u64,
    noise: usize,
    subject: String,
    role: String,
    purpose: String,
    environment: Vec<String>,
}

impl CorpusGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            noise: 0,
            subject: "Alice".to_string(),
            role: "CEO".to_string(),
            purpose: "perform CEO tasks".to_string(),
            environment: vec![
                "5/20/2020".to_string(),
                "security 1".to_string(),
                "morning".to_string(),
                "hp laptop".to_string(),
            ],
        }
    }

    /// Adds `count` policies that never grant a catalog item.
    pub fn with_noise(mut self, count: usize) -> Self {
        self.noise = count;
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = purpose.into();
        self
    }

    /// Environment attributes ABAC rules may require; must not be empty.
    pub fn with_environment<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let attributes: Vec<String> = attributes.into_iter().map(Into::into).collect();
        if !attributes.is_empty() {
            self.environment = attributes;
        }
        self
    }

    /// Generates a corpus covering `catalog` as `scenario` describes.
    pub fn generate(&self, catalog: &Catalog, scenario: Scenario) -> PolicyCorpus {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let grants = plan(catalog, scenario, &mut rng);

        let mut corpus = PolicyCorpus::default();
        if scenario != Scenario::NoMatch {
            corpus.abac = corpus
                .abac
                .assign_subject(&self.subject, [self.role.as_str()]);
            corpus.rbac = corpus.rbac.assign(&self.subject, &self.role);
        }

        for (item, conditions) in &grants {
            self.add_grants(&mut corpus, &mut rng, item, conditions);
        }
        self.add_noise(&mut corpus, scenario);

        let (abac, rbac, pbac) = corpus.rule_counts();
        info!(
            seed = self.seed,
            scenario = %scenario,
            items = grants.len(),
            abac,
            rbac,
            pbac,
            "Policy corpus generated"
        );
        corpus
    }

    fn add_grants(
        &self,
        corpus: &mut PolicyCorpus,
        rng: &mut StdRng,
        item: &ItemId,
        conditions: &[Option<String>],
    ) {
        let mut objects: Vec<String> = conditions.iter().flatten().cloned().collect();
        objects.push(OWNER_ATTRIBUTE.to_string());
        let abac = std::mem::take(&mut corpus.abac).assign_object(item.as_str(), objects);
        corpus.abac = abac;

        for condition in conditions {
            let environment = self
                .environment
                .choose(rng)
                .cloned()
                .unwrap_or_default();
            let object = condition.as_deref().unwrap_or(OWNER_ATTRIBUTE);
            let abac = std::mem::take(&mut corpus.abac).with_rule(AbacRule::new(
                item.clone(),
                self.role.as_str(),
                object,
                environment,
            ));
            corpus.abac = abac;

            let rbac = std::mem::take(&mut corpus.rbac).with_grant(RoleGrant::new(
                &self.role,
                item.as_str(),
                condition.as_deref(),
            ));
            corpus.rbac = rbac;

            let pbac = std::mem::take(&mut corpus.pbac).with_grant(PurposeGrant::new(
                &self.purpose,
                item.as_str(),
                condition.as_deref(),
            ));
            corpus.pbac = pbac;
        }
    }

    /// Policies on an item no template selects.
    ///
    /// Without matching policies the noise belongs to unrelated subjects;
    /// otherwise it is keyed by the run's own subject, role and purpose so
    /// every lookup has to wade through it.
    fn add_noise(&self, corpus: &mut PolicyCorpus, scenario: Scenario) {
        for i in 0..self.noise {
            let (subject, role, purpose) = if scenario == Scenario::NoMatch {
                let other = format!("attribute {i}");
                (other.clone(), other.clone(), other)
            } else {
                (self.subject.clone(), self.role.clone(), self.purpose.clone())
            };
            let note = format!("note {i}");

            let abac = std::mem::take(&mut corpus.abac)
                .assign_subject(&subject, [role.as_str()])
                .assign_object(NOISE_ITEM, [note.as_str()])
                .with_rule(AbacRule::new(NOISE_ITEM, role.as_str(), note.as_str(), ""));
            corpus.abac = abac;

            let rbac = std::mem::take(&mut corpus.rbac)
                .assign(&subject, &role)
                .with_grant(RoleGrant::new(&role, NOISE_ITEM, None));
            corpus.rbac = rbac;

            let pbac = std::mem::take(&mut corpus.pbac)
                .with_grant(PurposeGrant::new(&purpose, NOISE_ITEM, None));
            corpus.pbac = pbac;
        }
    }
}

/// Items to grant, each with the conditions of its grants (`None` for
/// an unconditional grant).
fn plan(
    catalog: &Catalog,
    scenario: Scenario,
    rng: &mut StdRng,
) -> BTreeMap<ItemId, Vec<Option<String>>> {
    let mut grants = BTreeMap::new();
    match scenario {
        Scenario::NoMatch => {}
        Scenario::Partial => {
            for template in catalog.iter() {
                let mut items = template.item_ids();
                items.shuffle(rng);
                for item in items.into_iter().take(2) {
                    if !grants.contains_key(&item) {
                        let conditions = conditioned(&item, rng);
                        grants.insert(item, conditions);
                    }
                }
            }
        }
        Scenario::AllConditioned => {
            for item in catalog.iter().flat_map(|t| t.item_ids()) {
                if !grants.contains_key(&item) {
                    let conditions = conditioned(&item, rng);
                    grants.insert(item, conditions);
                }
            }
        }
        Scenario::AllUnconditioned => {
            for item in catalog.iter().flat_map(|t| t.item_ids()) {
                grants.entry(item).or_insert_with(|| vec![None]);
            }
        }
    }
    grants
}

/// One to three distinct conditions drawn from the item's table pool.
///
/// Items without a table, or whose table has no pool, get one
/// unconditional grant.
fn conditioned(item: &ItemId, rng: &mut StdRng) -> Vec<Option<String>> {
    let pool = item.affinity().map_or(&[][..], condition_pool);
    if pool.is_empty() {
        return vec![None];
    }
    let count = rng.gen_range(1..=3).min(pool.len());
    pool.choose_multiple(rng, count)
        .map(|condition| Some((*condition).to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;
    use tempfile::tempdir;
    use test_case::test_case;
    use veil_types::{AccessModel, Condition, PolicyResolver, ResolveContext};

    use super::*;
    use crate::resolver::build_resolver;

    fn ctx() -> ResolveContext {
        ResolveContext::new("Alice")
            .with_purpose("perform CEO tasks")
            .with_environment(["5/20/2020", "security 1", "morning", "hp laptop"])
    }

    fn resolver(corpus: &PolicyCorpus, model: AccessModel) -> Arc<dyn PolicyResolver> {
        build_resolver(model, corpus, false)
    }

    #[test]
    fn test_generation_is_reproducible() {
        let catalog = Catalog::tpch().unwrap();
        let a = CorpusGenerator::new(7).with_noise(3).generate(&catalog, Scenario::Partial);
        let b = CorpusGenerator::new(7).with_noise(3).generate(&catalog, Scenario::Partial);
        assert_eq!(a, b);
    }

    #[test_case(AccessModel::Abac)]
    #[test_case(AccessModel::Rbac)]
    #[test_case(AccessModel::Pbac)]
    fn test_no_match_grants_nothing(model: AccessModel) {
        let catalog = Catalog::tpch().unwrap();
        let corpus = CorpusGenerator::new(1).with_noise(5).generate(&catalog, Scenario::NoMatch);
        let resolver = resolver(&corpus, model);
        for template in catalog.iter() {
            let res = resolver.resolve(&template.item_ids(), &ctx()).unwrap();
            assert!(res.decision.is_empty(), "{} under {model}", template.id());
        }
    }

    #[test_case(AccessModel::Abac)]
    #[test_case(AccessModel::Rbac)]
    #[test_case(AccessModel::Pbac)]
    fn test_all_unconditioned_grants_everything_plainly(model: AccessModel) {
        let catalog = Catalog::tpch().unwrap();
        let corpus = CorpusGenerator::new(2)
            .with_noise(2)
            .generate(&catalog, Scenario::AllUnconditioned);
        let resolver = resolver(&corpus, model);
        for template in catalog.iter() {
            let items = template.item_ids();
            let res = resolver.resolve(&items, &ctx()).unwrap();
            assert_eq!(res.decision.len(), items.len(), "{} under {model}", template.id());
            assert!(res.decision.iter().all(|(_, cond)| cond.is_none()));
        }
    }

    #[test_case(AccessModel::Abac)]
    #[test_case(AccessModel::Rbac)]
    #[test_case(AccessModel::Pbac)]
    fn test_all_conditioned_attaches_conditions(model: AccessModel) {
        let catalog = Catalog::tpch().unwrap();
        let corpus = CorpusGenerator::new(3).generate(&catalog, Scenario::AllConditioned);
        let resolver = resolver(&corpus, model);

        let q1 = catalog.get(veil_types::QueryId::new(1)).unwrap();
        let res = resolver.resolve(&q1.item_ids(), &ctx()).unwrap();
        assert_eq!(res.decision.len(), q1.item_ids().len());
        let condition = res
            .decision
            .condition(&ItemId::from("l_returnflag"))
            .unwrap();
        assert!(condition.predicate().starts_with("l_") || condition.predicate().starts_with("(l_"));
    }

    #[test]
    fn test_partial_grants_at_most_two_fresh_items_per_query() {
        let catalog = Catalog::tpch().unwrap();
        let corpus = CorpusGenerator::new(4).generate(&catalog, Scenario::Partial);
        let granted: std::collections::BTreeSet<_> =
            corpus.rbac.grants.iter().map(|g| g.item.clone()).collect();
        assert!(granted.len() <= 2 * catalog.len());
        assert!(!granted.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        let catalog = Catalog::tpch().unwrap();
        let corpus = CorpusGenerator::new(5).generate(&catalog, Scenario::AllConditioned);
        corpus.save(&path).unwrap();
        assert_eq!(PolicyCorpus::load(&path).unwrap(), corpus);
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        let err = PolicyCorpus::load(&path).unwrap_err();
        assert!(matches!(err, CorpusError::Json { .. }));
        assert!(err.to_string().contains("broken.json"));
    }

    proptest! {
        #[test]
        fn prop_conditions_stay_on_their_item_table(seed in any::<u64>()) {
            let catalog = Catalog::tpch().unwrap();
            let corpus = CorpusGenerator::new(seed).generate(&catalog, Scenario::AllConditioned);
            for grant in &corpus.rbac.grants {
                if let Some(predicate) = &grant.condition {
                    prop_assert_eq!(Condition::new(predicate.as_str()).affinity(), grant.item.affinity());
                }
            }
        }
    }

    #[test]
    fn test_scenario_parses() {
        assert_eq!("partial".parse::<Scenario>(), Ok(Scenario::Partial));
        assert_eq!(
            "ALL-CONDITIONED".parse::<Scenario>(),
            Ok(Scenario::AllConditioned)
        );
        assert!("everything".parse::<Scenario>().is_err());
    }
}
