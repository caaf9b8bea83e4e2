//! One resolve-rewrite-execute cycle for a single template.
//!
//! ```text
//! RESOLVE ── deny-all ──────────────────────────────► DONE
//!    │
//!  PRUNE ─── empty projection ──────────────────────► DONE
//!    │
//!  INJECT ─► CREATE_VIEWS ─► EXECUTE ─► DROP_VIEWS ─► DONE
//!                 │             │           ▲
//!                 └── failure ──┴───────────┘
//! ```
//!
//! Lookup and execution run on blocking worker threads under their own
//! deadlines. Views created by a cycle are recorded in a ledger shared with
//! the worker, so they are dropped even when the worker times out.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use veil_query::{FinalStatement, QueryTemplate, RewriteOutcome, ViewNamer, rewrite};
use veil_types::{
    AccessModel, CycleId, EphemeralView, PermissionDecision, PolicyResolver, QueryId,
    ResolveContext, ResolveStats, Resolution,
};

use crate::engine::Engine;
use crate::error::{CycleError, Result, Stage};
use crate::executor::{ExecutionReport, execute};
use crate::metrics::QueryMetrics;
use crate::views::{ViewLedger, ViewScope, release_with_fresh_session};

/// Default budget for policy lookups.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);
/// Default budget for creating views, executing and dropping views.
pub const DEFAULT_EXECUTE_TIMEOUT: Duration = Duration::from_secs(60);

/// What one cycle decided and produced.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub query: QueryId,
    pub cycle: CycleId,
    pub model: AccessModel,
    pub decision: PermissionDecision,
    pub stats: ResolveStats,
    pub outcome: RewriteOutcome,
    /// `None` when the template was suppressed or only planned.
    pub execution: Option<ExecutionReport>,
    pub resolve_elapsed: Duration,
    pub rewrite_elapsed: Duration,
    pub execute_elapsed: Duration,
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

impl CycleReport {
    pub fn row_count(&self) -> usize {
        self.execution.as_ref().map_or(0, |e| e.row_count)
    }

    pub fn metrics(&self) -> QueryMetrics {
        QueryMetrics {
            query_id: self.query,
            model: self.model,
            resolve_duration_ms: millis(self.resolve_elapsed),
            rewrite_duration_ms: millis(self.rewrite_elapsed),
            execute_duration_ms: millis(self.execute_elapsed),
            policy_lookup_count: self.stats.lookups,
            applied_rule_count: self.stats.applied_rules,
            row_count: self.row_count(),
            suppressed: self.outcome.is_suppressed(),
            suppression: self.outcome.suppression.as_ref().map(ToString::to_string),
            error: None,
        }
    }
}

/// A cycle that failed, with what it measured before failing.
///
/// `report` is present once the decision was resolved; it carries the lookup
/// counters and the timings up to the failure.
#[derive(Debug)]
pub struct CycleFailure {
    pub error: CycleError,
    pub report: Option<Box<CycleReport>>,
}

impl CycleFailure {
    /// Metrics for the failed query, keeping whatever was measured.
    pub fn metrics(&self, query: QueryId, model: AccessModel) -> QueryMetrics {
        match &self.report {
            Some(report) => {
                let mut metrics = report.metrics();
                metrics.row_count = 0;
                metrics.error = Some(self.error.to_string());
                metrics
            }
            None => QueryMetrics::failed(query, model, self.error.to_string()),
        }
    }
}

impl From<CycleError> for CycleFailure {
    fn from(error: CycleError) -> Self {
        Self {
            error,
            report: None,
        }
    }
}

/// Runs templates for one subject under one access model.
#[derive(Clone)]
pub struct QueryCycle {
    engine: Arc<dyn Engine>,
    resolver: Arc<dyn PolicyResolver>,
    context: ResolveContext,
    lookup_timeout: Duration,
    execute_timeout: Duration,
}

impl std::fmt::Debug for QueryCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCycle")
            .field("engine", &self.engine.name())
            .field("model", &self.resolver.model())
            .field("context", &self.context)
            .field("lookup_timeout", &self.lookup_timeout)
            .field("execute_timeout", &self.execute_timeout)
            .finish()
    }
}

impl QueryCycle {
    pub fn new(
        engine: Arc<dyn Engine>,
        resolver: Arc<dyn PolicyResolver>,
        context: ResolveContext,
    ) -> Self {
        Self {
            engine,
            resolver,
            context,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            execute_timeout: DEFAULT_EXECUTE_TIMEOUT,
        }
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub fn with_execute_timeout(mut self, timeout: Duration) -> Self {
        self.execute_timeout = timeout;
        self
    }

    pub fn model(&self) -> AccessModel {
        self.resolver.model()
    }

    /// Resolves and rewrites `template` without touching the engine.
    pub async fn plan(&self, template: &QueryTemplate) -> Result<CycleReport> {
        let cycle = CycleId::next();
        let model = self.resolver.model();
        info!(query = %template.id(), cycle = %cycle, model = ?model, "Cycle started");

        let start = Instant::now();
        let Resolution { decision, stats } = self.resolve(template).await?;
        let resolve_elapsed = start.elapsed();
        debug!(
            query = %template.id(),
            granted = decision.len(),
            lookups = stats.lookups,
            "Decision resolved"
        );

        let start = Instant::now();
        let outcome = rewrite(template, &decision, &mut ViewNamer::new(cycle));
        let rewrite_elapsed = start.elapsed();
        if let Some(reason) = &outcome.suppression {
            warn!(query = %template.id(), cycle = %cycle, reason = %reason, "Query suppressed");
        }

        Ok(CycleReport {
            query: template.id(),
            cycle,
            model,
            decision,
            stats,
            outcome,
            execution: None,
            resolve_elapsed,
            rewrite_elapsed,
            execute_elapsed: Duration::ZERO,
        })
    }

    /// Runs the full cycle for `template`.
    ///
    /// A suppressed template creates no views and runs no statement.
    pub async fn run(&self, template: &QueryTemplate) -> Result<CycleReport> {
        self.run_measured(template)
            .await
            .map_err(|failure| failure.error)
    }

    /// Like [`run`](Self::run), but a failure after resolution keeps the
    /// partial report.
    pub async fn run_measured(
        &self,
        template: &QueryTemplate,
    ) -> std::result::Result<CycleReport, CycleFailure> {
        let mut report = self.plan(template).await?;
        if report.outcome.is_suppressed() {
            return Ok(report);
        }

        let start = Instant::now();
        let execution = match self.execute(report.cycle, &report.outcome).await {
            Ok(execution) => execution,
            Err(error) => {
                report.execute_elapsed = start.elapsed();
                return Err(CycleFailure {
                    error,
                    report: Some(Box::new(report)),
                });
            }
        };
        report.execute_elapsed = start.elapsed();
        info!(
            query = %report.query,
            cycle = %report.cycle,
            rows = execution.row_count,
            views = report.outcome.supporting_views.len(),
            "Cycle complete"
        );
        report.execution = Some(execution);
        Ok(report)
    }

    async fn resolve(&self, template: &QueryTemplate) -> Result<Resolution> {
        let resolver = Arc::clone(&self.resolver);
        let candidates = template.item_ids();
        let context = self.context.clone();

        let lookup = tokio::task::spawn_blocking(move || resolver.resolve(&candidates, &context));
        match tokio::time::timeout(self.lookup_timeout, lookup).await {
            Ok(Ok(Ok(resolution))) => Ok(resolution),
            Ok(Ok(Err(err))) => {
                warn!(query = %template.id(), error = %err, "Policy lookup failed");
                Err(err.into())
            }
            Ok(Err(join_err)) => Err(CycleError::Worker(join_err.to_string())),
            Err(_) => Err(CycleError::Timeout {
                stage: Stage::Lookup,
                budget: self.lookup_timeout,
            }),
        }
    }

    async fn execute(&self, cycle: CycleId, outcome: &RewriteOutcome) -> Result<ExecutionReport> {
        let ledger = Arc::new(ViewLedger::new());
        let engine = Arc::clone(&self.engine);
        let worker_ledger = Arc::clone(&ledger);
        let views = outcome.supporting_views.clone();
        let statements = outcome.final_statements.clone();

        let worker = tokio::task::spawn_blocking(move || {
            run_statements(engine.as_ref(), worker_ledger, &views, &statements)
        });
        match tokio::time::timeout(self.execute_timeout, worker).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(CycleError::Worker(join_err.to_string())),
            Err(_) => {
                warn!(cycle = %cycle, budget = ?self.execute_timeout, "Execution timed out");
                // The worker cannot be interrupted. A statement it already has in
                // flight may lose its views below and fail; that result is
                // discarded. Every later statement is refused.
                ledger.abandon();
                self.release_abandoned(cycle, ledger).await;
                Err(CycleError::Timeout {
                    stage: Stage::Execute,
                    budget: self.execute_timeout,
                })
            }
        }
    }

    /// Drops the views of a worker that missed its deadline.
    async fn release_abandoned(&self, cycle: CycleId, ledger: Arc<ViewLedger>) {
        let engine = Arc::clone(&self.engine);
        let cleanup =
            tokio::task::spawn_blocking(move || release_with_fresh_session(engine.as_ref(), &ledger))
                .await;
        match cleanup {
            Ok(Ok(())) => debug!(cycle = %cycle, "Abandoned views released"),
            Ok(Err(err)) => warn!(cycle = %cycle, error = %err, "Failed to release views"),
            Err(join_err) => warn!(cycle = %cycle, error = %join_err, "View cleanup panicked"),
        }
    }
}

/// CREATE_VIEWS, EXECUTE and DROP_VIEWS on one fresh session.
///
/// Views are released whether or not creation and execution succeeded.
fn run_statements(
    engine: &dyn Engine,
    ledger: Arc<ViewLedger>,
    views: &[EphemeralView],
    statements: &[FinalStatement],
) -> Result<ExecutionReport> {
    let session = engine.connect()?;
    let mut scope = ViewScope::new(session, ledger);

    let result = create_and_execute(&mut scope, views, statements);
    let released = scope.release();
    match (result, released) {
        (Ok(report), Ok(())) => Ok(report),
        (Ok(_), Err(err)) => Err(err.into()),
        (Err(err), _) => Err(err),
    }
}

fn create_and_execute(
    scope: &mut ViewScope,
    views: &[EphemeralView],
    statements: &[FinalStatement],
) -> Result<ExecutionReport> {
    for view in views {
        scope.create(view)?;
    }
    execute(scope, statements)
}
