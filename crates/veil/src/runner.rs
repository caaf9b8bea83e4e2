//! Runs the catalog, one cycle per template.

use std::sync::Arc;

use tracing::{info, warn};
use veil_query::{Catalog, QueryTemplate};
use veil_types::QueryId;

use crate::cycle::{CycleFailure, CycleReport, QueryCycle};
use crate::error::CycleError;
use crate::metrics::{MetricsSink, QueryMetrics};

/// How one template ended.
#[derive(Debug)]
pub enum QueryOutcome {
    Completed(CycleReport),
    /// `report` holds what was measured when the failure came after resolution.
    Failed {
        query: QueryId,
        error: CycleError,
        report: Option<Box<CycleReport>>,
    },
}

impl QueryOutcome {
    pub fn query(&self) -> QueryId {
        match self {
            QueryOutcome::Completed(report) => report.query,
            QueryOutcome::Failed { query, .. } => *query,
        }
    }
}

/// Outcomes of a catalog run, in query order.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<QueryOutcome>,
}

impl RunSummary {
    fn reports(&self) -> impl Iterator<Item = &CycleReport> {
        self.outcomes.iter().filter_map(|o| match o {
            QueryOutcome::Completed(report) => Some(report),
            QueryOutcome::Failed { .. } => None,
        })
    }

    /// Templates that ran to completion.
    pub fn executed(&self) -> usize {
        self.reports().filter(|r| r.execution.is_some()).count()
    }

    pub fn suppressed(&self) -> usize {
        self.reports().filter(|r| r.outcome.is_suppressed()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.reports().count()
    }

    pub fn total_rows(&self) -> usize {
        self.reports().map(CycleReport::row_count).sum()
    }
}

/// Drives a [`QueryCycle`] over a catalog and reports every cycle.
///
/// A failing template is recorded and the run moves on; nothing is retried.
pub struct CatalogRunner {
    cycle: QueryCycle,
    sinks: Vec<Arc<dyn MetricsSink>>,
}

impl CatalogRunner {
    pub fn new(cycle: QueryCycle) -> Self {
        Self {
            cycle,
            sinks: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Runs every template of `catalog`.
    pub async fn run(&self, catalog: &Catalog) -> RunSummary {
        self.run_templates(catalog.iter()).await
    }

    /// Runs the given templates in order.
    pub async fn run_templates<'a>(
        &self,
        templates: impl IntoIterator<Item = &'a QueryTemplate>,
    ) -> RunSummary {
        let mut summary = RunSummary::default();
        for template in templates {
            let outcome = match self.cycle.run_measured(template).await {
                Ok(report) => {
                    self.publish(&report.metrics());
                    QueryOutcome::Completed(report)
                }
                Err(failure) => {
                    let error = &failure.error;
                    warn!(query = %template.id(), kind = error.kind(), error = %error, "Query failed");
                    self.publish(&failure.metrics(template.id(), self.cycle.model()));
                    let CycleFailure { error, report } = failure;
                    QueryOutcome::Failed {
                        query: template.id(),
                        error,
                        report,
                    }
                }
            };
            summary.outcomes.push(outcome);
        }

        info!(
            model = %self.cycle.model(),
            executed = summary.executed(),
            suppressed = summary.suppressed(),
            failed = summary.failed(),
            rows = summary.total_rows(),
            "Catalog run complete"
        );
        summary
    }

    fn publish(&self, metrics: &QueryMetrics) {
        for sink in &self.sinks {
            if let Err(err) = sink.record(metrics) {
                warn!(query = %metrics.query_id, error = %err, "Failed to record metrics");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use veil_types::{AccessModel, ResolveContext};

    use super::*;
    use crate::corpus::PolicyCorpus;
    use crate::engine::ScriptedEngine;
    use crate::metrics::MemorySink;
    use crate::resolver::build_resolver;

    fn runner(engine: ScriptedEngine, model: AccessModel, sink: Arc<MemorySink>) -> CatalogRunner {
        let cycle = QueryCycle::new(
            Arc::new(engine),
            build_resolver(model, &PolicyCorpus::default(), false),
            ResolveContext::new("Alice"),
        );
        CatalogRunner::new(cycle).with_sink(sink)
    }

    #[tokio::test]
    async fn test_unrestricted_run_covers_catalog() {
        let catalog = Catalog::tpch().unwrap();
        let sink = Arc::new(MemorySink::new());
        let summary = runner(ScriptedEngine::new(), AccessModel::Unrestricted, Arc::clone(&sink))
            .run(&catalog)
            .await;

        assert_eq!(summary.outcomes.len(), 22);
        assert_eq!(summary.executed(), 22);
        assert_eq!(summary.failed(), 0);
        assert_eq!(sink.records().len(), 22);
    }

    #[tokio::test]
    async fn test_empty_corpus_suppresses_everything() {
        let catalog = Catalog::tpch().unwrap();
        let sink = Arc::new(MemorySink::new());
        let engine = ScriptedEngine::new();
        let summary = runner(engine.clone(), AccessModel::Abac, Arc::clone(&sink))
            .run(&catalog)
            .await;

        assert_eq!(summary.suppressed(), 22);
        assert!(engine.statements().is_empty());
        assert!(sink.records().iter().all(|m| m.suppressed && m.row_count == 0));
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_run() {
        let catalog = Catalog::tpch().unwrap();
        let sink = Arc::new(MemorySink::new());
        let engine = ScriptedEngine::new().fail_when("from part");
        let summary = runner(engine, AccessModel::Unrestricted, Arc::clone(&sink))
            .run(&catalog)
            .await;

        assert!(summary.failed() > 0);
        assert_eq!(summary.outcomes.len(), 22);
        assert!(matches!(
            summary.outcomes.iter().find(|o| o.query() == QueryId::new(1)),
            Some(QueryOutcome::Completed(_))
        ));
        let failed = sink.records().iter().filter(|m| m.error.is_some()).count();
        assert_eq!(failed, summary.failed());
    }

    #[tokio::test]
    async fn test_failed_query_keeps_resolution_metrics() {
        let catalog = Catalog::tpch().unwrap();
        let q12 = catalog.get(QueryId::new(12)).unwrap();
        let mut corpus = PolicyCorpus::default();
        corpus.rbac = corpus
            .rbac
            .assign("Alice", "CEO")
            .with_grant(veil_rbac::RoleGrant::new("CEO", "l_shipmode", None))
            .with_grant(veil_rbac::RoleGrant::new("CEO", "sum(o_orderpriority)", None));

        let sink = Arc::new(MemorySink::new());
        let cycle = QueryCycle::new(
            Arc::new(ScriptedEngine::new().fail_when("select l_shipmode")),
            build_resolver(AccessModel::Rbac, &corpus, false),
            ResolveContext::new("Alice"),
        );
        let summary = CatalogRunner::new(cycle)
            .with_sink(Arc::clone(&sink) as Arc<dyn MetricsSink>)
            .run_templates([q12])
            .await;

        assert_eq!(summary.failed(), 1);
        match &summary.outcomes[0] {
            QueryOutcome::Failed { error, report, .. } => {
                assert!(matches!(error, CycleError::Execution(_)));
                let report = report.as_ref().unwrap();
                assert_eq!(report.stats.lookups, 2);
            }
            QueryOutcome::Completed(_) => panic!("Q12 should fail"),
        }

        let records = sink.records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert!(record.error.is_some());
        assert_eq!(record.policy_lookup_count, 2);
        assert_eq!(record.applied_rule_count, 2);
        assert_eq!(record.row_count, 0);
        assert!(!record.suppressed);
    }

    #[tokio::test]
    async fn test_lookup_failure_records_zero_counters() {
        #[derive(Debug)]
        struct Unavailable;

        impl veil_types::PolicyResolver for Unavailable {
            fn model(&self) -> AccessModel {
                AccessModel::Pbac
            }

            fn resolve(
                &self,
                _candidates: &[veil_types::ItemId],
                _context: &ResolveContext,
            ) -> Result<veil_types::Resolution, veil_types::PolicyLookupError> {
                Err(veil_types::PolicyLookupError::Unavailable {
                    store: "purpose",
                    reason: "store offline".to_string(),
                })
            }
        }

        let catalog = Catalog::tpch().unwrap();
        let sink = Arc::new(MemorySink::new());
        let cycle = QueryCycle::new(
            Arc::new(ScriptedEngine::new()),
            Arc::new(Unavailable),
            ResolveContext::new("Alice"),
        );
        let summary = CatalogRunner::new(cycle)
            .with_sink(Arc::clone(&sink) as Arc<dyn MetricsSink>)
            .run_templates(catalog.get(QueryId::new(6)))
            .await;

        assert!(matches!(
            &summary.outcomes[0],
            QueryOutcome::Failed { report: None, .. }
        ));
        let records = sink.records();
        assert_eq!(records[0].policy_lookup_count, 0);
        assert_eq!(records[0].model, AccessModel::Pbac);
    }
}
