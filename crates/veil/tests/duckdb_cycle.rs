//! End-to-end cycles against an embedded DuckDB database.

use std::sync::Arc;

use veil::engine::{Engine, Value};
use veil::schema::{provision, seed_sample};
use veil::views::{ViewLedger, ViewScope};
use veil::{
    AccessModel, Catalog, CatalogRunner, CorpusGenerator, CycleError, DuckDbEngine, EphemeralView,
    MemorySink, PolicyCorpus, QueryCycle, QueryId, ResolveContext, Scenario, build_resolver,
};
use veil_rbac::RoleGrant;

fn engine() -> Arc<DuckDbEngine> {
    let engine = DuckDbEngine::in_memory().expect("open duckdb");
    let mut session = engine.connect().expect("connect");
    provision(session.as_mut()).expect("provision");
    seed_sample(session.as_mut()).expect("seed");
    Arc::new(engine)
}

fn context() -> ResolveContext {
    ResolveContext::new("Alice")
        .with_purpose("perform CEO tasks")
        .with_environment(["5/20/2020", "security 1", "morning", "hp laptop"])
}

fn cycle(engine: &Arc<DuckDbEngine>, model: AccessModel, corpus: &PolicyCorpus) -> QueryCycle {
    QueryCycle::new(
        Arc::clone(engine) as Arc<dyn Engine>,
        build_resolver(model, corpus, false),
        context(),
    )
}

fn leftover_views(engine: &DuckDbEngine) -> i64 {
    let mut session = engine.connect().expect("connect");
    let rows = session
        .query("select count(*) from information_schema.tables where table_name like 'veil_%'")
        .expect("count views");
    match rows.rows[0][0] {
        Value::Integer(n) => n,
        ref other => panic!("unexpected count {other:?}"),
    }
}

#[tokio::test]
async fn test_unrestricted_catalog_runs_cleanly() {
    let engine = engine();
    let catalog = Catalog::tpch().unwrap();
    let sink = Arc::new(MemorySink::new());
    let cycle = cycle(&engine, AccessModel::Unrestricted, &PolicyCorpus::default());
    let runner = CatalogRunner::new(cycle).with_sink(sink.clone());

    let summary = runner.run(&catalog).await;

    for outcome in &summary.outcomes {
        if let veil::QueryOutcome::Failed { query, error, .. } = outcome {
            panic!("{query} failed: {error}");
        }
    }
    assert_eq!(summary.executed(), 22);
    assert_eq!(summary.suppressed(), 0);
    assert_eq!(sink.records().len(), 22);
    assert_eq!(leftover_views(&engine), 0);
}

#[tokio::test]
async fn test_unrestricted_rows_match_raw_text() {
    let engine = engine();
    let catalog = Catalog::tpch().unwrap();
    let cycle = cycle(&engine, AccessModel::Unrestricted, &PolicyCorpus::default());

    for id in [1, 3, 6, 10, 13, 22] {
        let template = catalog.get(QueryId::new(id)).unwrap();
        let raw = engine
            .connect()
            .unwrap()
            .query(template.raw_text())
            .unwrap();
        let report = cycle.run(template).await.unwrap();

        let rows = report.execution.unwrap().rows;
        assert_eq!(rows.columns, raw.columns, "Q{id}");
        assert_eq!(rows.rows, raw.rows, "Q{id}");
    }
}

#[tokio::test]
async fn test_two_views_are_used_and_dropped() {
    let engine = engine();
    let catalog = Catalog::tpch().unwrap();
    let q3 = catalog.get(QueryId::new(3)).unwrap();

    let mut corpus = PolicyCorpus::default();
    corpus.rbac = corpus
        .rbac
        .assign("Alice", "CEO")
        .with_grant(RoleGrant::new("CEO", "l_orderkey", Some("l_quantity > 20")))
        .with_grant(RoleGrant::new("CEO", "o_orderdate", Some("o_totalprice > 1000")))
        .with_grant(RoleGrant::new("CEO", "o_shippriority", None));

    let report = cycle(&engine, AccessModel::Rbac, &corpus)
        .run(q3)
        .await
        .unwrap();

    assert_eq!(report.outcome.supporting_views.len(), 2);
    let sql = &report.outcome.final_statements[0].sql;
    for view in &report.outcome.supporting_views {
        assert!(sql.contains(&view.name), "{sql}");
    }
    assert_eq!(report.execution.unwrap().rows.columns.len(), 3);
    assert_eq!(leftover_views(&engine), 0);
}

#[tokio::test]
async fn test_condition_restricts_rows() {
    let engine = engine();
    let catalog = Catalog::tpch().unwrap();
    let q1 = catalog.get(QueryId::new(1)).unwrap();

    let open = cycle(&engine, AccessModel::Unrestricted, &PolicyCorpus::default())
        .run(q1)
        .await
        .unwrap();

    let mut corpus = PolicyCorpus::default();
    corpus.pbac = q1.item_ids().iter().fold(corpus.pbac, |store, item| {
        store.with_grant(veil_rbac::PurposeGrant::new(
            "perform CEO tasks",
            item.as_str(),
            Some("l_returnflag = 'N'"),
        ))
    });
    let restricted = cycle(&engine, AccessModel::Pbac, &corpus)
        .run(q1)
        .await
        .unwrap();

    assert!(restricted.row_count() < open.row_count());
    assert!(restricted.row_count() > 0);
}

#[tokio::test]
async fn test_supporting_relation_is_dropped() {
    let engine = engine();
    let catalog = Catalog::tpch().unwrap();
    let q15 = catalog.get(QueryId::new(15)).unwrap();

    let mut corpus = PolicyCorpus::default();
    corpus.rbac = q15.item_ids().iter().fold(corpus.rbac.assign("Alice", "CEO"), |store, item| {
        store.with_grant(RoleGrant::new("CEO", item.as_str(), None))
    });
    corpus.rbac = corpus
        .rbac
        .with_grant(RoleGrant::new("CEO", "sum(l_discount)", Some("l_quantity > 10")));

    let report = cycle(&engine, AccessModel::Rbac, &corpus)
        .run(q15)
        .await
        .unwrap();
    assert!(report.outcome.final_statements[0].sql.contains("l_quantity > 10"));
    assert!(report.execution.is_some());
    assert_eq!(leftover_views(&engine), 0);
}

#[tokio::test]
async fn test_generated_corpus_runs_without_failures() {
    let engine = engine();
    let catalog = Catalog::tpch().unwrap();
    let corpus = CorpusGenerator::new(42)
        .with_noise(10)
        .generate(&catalog, Scenario::AllConditioned);

    for model in [AccessModel::Abac, AccessModel::Rbac, AccessModel::Pbac] {
        let summary = CatalogRunner::new(cycle(&engine, model, &corpus))
            .run(&catalog)
            .await;

        assert_eq!(summary.failed(), 0, "{model}");
        assert!(summary.executed() > 0, "{model}");
        assert_eq!(leftover_views(&engine), 0, "{model}");
    }
}

#[test]
fn test_existing_relation_is_never_replaced() {
    let engine = engine();
    let mut session = engine.connect().unwrap();
    session
        .execute("create view veil_c0_v1 as select * from region")
        .unwrap();

    let mut scope = ViewScope::new(engine.connect().unwrap(), Arc::new(ViewLedger::new()));
    let err = scope
        .create(&EphemeralView::new("veil_c0_v1", "select * from nation"))
        .unwrap_err();
    assert!(matches!(err, CycleError::ViewConflict { .. }));

    let rows = session.query("select * from veil_c0_v1").unwrap();
    assert_eq!(rows.columns[0], "r_regionkey");
}

#[tokio::test]
async fn test_views_left_by_an_earlier_run_do_not_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tpch.duckdb");
    let engine = Arc::new(DuckDbEngine::open(Some(path.as_path())).unwrap());
    let mut session = engine.connect().unwrap();
    provision(session.as_mut()).unwrap();
    seed_sample(session.as_mut()).unwrap();
    // What a crashed process with low cycle numbers would have left behind.
    for cycle in 1..=8 {
        for view in 1..=3 {
            session
                .execute(&format!("create view veil_c{cycle}_v{view} as select * from region"))
                .unwrap();
        }
    }

    let catalog = Catalog::tpch().unwrap();
    let q3 = catalog.get(QueryId::new(3)).unwrap();
    let mut corpus = PolicyCorpus::default();
    corpus.rbac = corpus
        .rbac
        .assign("Alice", "CEO")
        .with_grant(RoleGrant::new("CEO", "l_orderkey", Some("l_quantity > 20")))
        .with_grant(RoleGrant::new("CEO", "o_orderdate", Some("o_totalprice > 1000")))
        .with_grant(RoleGrant::new("CEO", "o_shippriority", None));

    let cycle = cycle(&engine, AccessModel::Rbac, &corpus);
    for _ in 0..3 {
        let report = cycle.run(q3).await.unwrap();
        assert_eq!(report.outcome.supporting_views.len(), 2);
    }
    assert_eq!(leftover_views(&engine), 24);
}
