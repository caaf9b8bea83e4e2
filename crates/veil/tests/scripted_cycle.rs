//! Cycle behaviour under a recording engine: ordering, failures, timeouts.

use std::sync::Arc;
use std::time::Duration;

use veil::{
    AccessModel, Catalog, CycleError, ItemId, PermissionDecision, PolicyResolver, QueryCycle,
    QueryId, ResolveContext, ScriptedEngine, Stage, StatementKind,
};
use veil_types::{Condition, PolicyLookupError, ResolveStats, Resolution};

/// Grants the listed items that are among the candidates, after `delay`.
#[derive(Debug)]
struct SlowResolver {
    grants: Vec<(&'static str, Option<&'static str>)>,
    delay: Duration,
}

impl SlowResolver {
    fn new(grants: Vec<(&'static str, Option<&'static str>)>) -> Self {
        Self {
            grants,
            delay: Duration::ZERO,
        }
    }
}

impl PolicyResolver for SlowResolver {
    fn model(&self) -> AccessModel {
        AccessModel::Abac
    }

    fn resolve(
        &self,
        candidates: &[ItemId],
        _context: &ResolveContext,
    ) -> Result<Resolution, PolicyLookupError> {
        std::thread::sleep(self.delay);
        let mut decision = PermissionDecision::new();
        for (item, condition) in &self.grants {
            let item = ItemId::from(*item);
            if candidates.contains(&item) {
                decision.grant(item, condition.map(Condition::new));
            }
        }
        Ok(Resolution {
            decision,
            stats: ResolveStats::default(),
        })
    }
}

fn cycle(engine: &ScriptedEngine, resolver: SlowResolver) -> QueryCycle {
    QueryCycle::new(
        Arc::new(engine.clone()),
        Arc::new(resolver),
        ResolveContext::new("Alice"),
    )
}

fn q3_grants() -> Vec<(&'static str, Option<&'static str>)> {
    vec![
        ("l_orderkey", Some("l_quantity > 10")),
        ("o_orderdate", Some("o_totalprice > 1000")),
    ]
}

#[tokio::test]
async fn test_views_complete_before_execution_and_drop_after() {
    let catalog = Catalog::tpch().unwrap();
    let engine = ScriptedEngine::new();
    cycle(&engine, SlowResolver::new(q3_grants()))
        .run(catalog.get(QueryId::new(3)).unwrap())
        .await
        .unwrap();

    let kinds: Vec<&str> = engine
        .statements()
        .iter()
        .map(|sql| {
            if sql.starts_with("create view") {
                "create"
            } else if sql.starts_with("drop view") {
                "drop"
            } else {
                "query"
            }
        })
        .collect();
    assert_eq!(kinds, ["create", "create", "query", "drop", "drop"]);
}

#[tokio::test]
async fn test_view_creation_failure_drops_earlier_views() {
    let catalog = Catalog::tpch().unwrap();
    // The second view filters lineitem.
    let engine = ScriptedEngine::new().fail_when("from lineitem where");
    let err = cycle(&engine, SlowResolver::new(q3_grants()))
        .run(catalog.get(QueryId::new(3)).unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, CycleError::Execution(_)));
    assert!(engine.live_relations().is_empty());
    assert!(
        engine
            .statements()
            .iter()
            .all(|sql| !sql.starts_with("select"))
    );
}

#[tokio::test]
async fn test_nested_subquery_gains_where_and_is_referenced_once() {
    let catalog = Catalog::tpch().unwrap();
    let engine = ScriptedEngine::new();
    let report = cycle(
        &engine,
        SlowResolver::new(vec![
            ("count(o_orderkey)", Some("o_totalprice > 1000")),
            ("count(c_custkey)", None),
        ]),
    )
    .run(catalog.get(QueryId::new(13)).unwrap())
    .await
    .unwrap();

    let view = &report.outcome.supporting_views[0];
    assert!(view.definition.contains(" where o_totalprice > 1000 "));
    let sql = &report.outcome.final_statements[0].sql;
    assert_eq!(sql.matches(view.name.as_str()).count(), 1);
    assert!(engine.live_relations().is_empty());
}

#[tokio::test]
async fn test_multi_statement_relation_is_cycle_scoped() {
    let catalog = Catalog::tpch().unwrap();
    let q15 = catalog.get(QueryId::new(15)).unwrap();
    let engine = ScriptedEngine::new();
    let all: Vec<(&'static str, Option<&'static str>)> = vec![
        ("s_suppkey", None),
        ("s_name", None),
        ("s_address", None),
        ("s_phone", None),
        ("l_suppkey", None),
        ("sum(l_extendedprice)", None),
        ("sum(l_discount)", None),
    ];
    let report = cycle(&engine, SlowResolver::new(all)).run(q15).await.unwrap();

    let StatementKind::CreateRelation(name) = &report.outcome.final_statements[0].kind else {
        panic!("first statement must create the relation");
    };
    assert!(name.starts_with(&format!("veil_c{}_", report.cycle)));
    assert!(engine.live_relations().is_empty());
}

#[tokio::test]
async fn test_lookup_timeout() {
    let catalog = Catalog::tpch().unwrap();
    let engine = ScriptedEngine::new();
    let resolver = SlowResolver {
        grants: q3_grants(),
        delay: Duration::from_millis(500),
    };
    let err = cycle(&engine, resolver)
        .with_lookup_timeout(Duration::from_millis(20))
        .run(catalog.get(QueryId::new(3)).unwrap())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CycleError::Timeout {
            stage: Stage::Lookup,
            ..
        }
    ));
    assert!(engine.statements().is_empty());
}

#[tokio::test]
async fn test_execution_timeout_releases_views() {
    let catalog = Catalog::tpch().unwrap();
    let engine = ScriptedEngine::new().with_latency(Duration::from_millis(100));
    let err = cycle(&engine, SlowResolver::new(q3_grants()))
        .with_execute_timeout(Duration::from_millis(150))
        .run(catalog.get(QueryId::new(3)).unwrap())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CycleError::Timeout {
            stage: Stage::Execute,
            ..
        }
    ));

    // The abandoned worker finishes on its own and drops what it created.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(engine.live_relations().is_empty());
    assert!(
        engine
            .statements()
            .iter()
            .any(|sql| sql.starts_with("drop view"))
    );
}

#[tokio::test]
async fn test_timed_out_worker_runs_no_later_statement() {
    let catalog = Catalog::tpch().unwrap();
    let engine = ScriptedEngine::new().with_latency(Duration::from_millis(100));
    let err = cycle(&engine, SlowResolver::new(q3_grants()))
        .with_execute_timeout(Duration::from_millis(150))
        .run(catalog.get(QueryId::new(3)).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CycleError::Timeout {
            stage: Stage::Execute,
            ..
        }
    ));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let statements = engine.statements();
    assert!(
        !statements.iter().any(|sql| sql.starts_with("select")),
        "{statements:?}"
    );
    assert!(engine.live_relations().is_empty());
}
