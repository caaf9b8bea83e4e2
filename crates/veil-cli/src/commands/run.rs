//! `veil run`

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Args;
use veil::{
    Catalog, CatalogRunner, CycleReport, DuckDbEngine, Engine, JsonLinesSink, QueryId, QueryOutcome,
    RunSummary, ScriptedEngine, TracingSink, schema,
};
use veil_config::VeilConfig;

use super::{PolicyArgs, build_cycle, load_config};
use crate::style::{SemanticStyle, print_labeled, print_rows, print_success, styled_table};

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Query number to run; repeat for several. Runs all 22 when omitted.
    #[arg(short, long = "query", value_name = "N")]
    pub queries: Vec<u32>,

    /// Resolve and rewrite, but send statements to a recording engine.
    #[arg(long)]
    pub dry_run: bool,

    /// DuckDB database file (in-memory when unset).
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// Insert the bundled sample rows into empty tables.
    #[arg(long)]
    pub sample: bool,

    /// Append one JSON metrics record per query to this file.
    #[arg(long)]
    pub metrics: Option<PathBuf>,

    /// Print the rows each query returned.
    #[arg(long)]
    pub show_rows: bool,
}

pub async fn run(project: &Path, args: &RunArgs, policy: &PolicyArgs) -> Result<()> {
    let mut config = load_config(project, policy)?;
    if let Some(database) = &args.database {
        config.engine.database = Some(database.clone());
    }
    if let Some(metrics) = &args.metrics {
        config.metrics.output = Some(metrics.clone());
    }

    let catalog = Catalog::tpch()?;
    let templates = if args.queries.is_empty() {
        catalog.iter().collect::<Vec<_>>()
    } else {
        args.queries
            .iter()
            .map(|&n| {
                catalog
                    .get(QueryId::new(n))
                    .with_context(|| format!("No query template Q{n} (expected 1-22)"))
            })
            .collect::<Result<Vec<_>>>()?
    };

    let engine = open_engine(&config, args)?;
    let mut runner = CatalogRunner::new(build_cycle(&config, engine, policy.audit)?)
        .with_sink(Arc::new(TracingSink));
    if let Some(path) = &config.metrics.output {
        let sink = JsonLinesSink::open(path)
            .with_context(|| format!("Failed to open metrics file {}", path.display()))?;
        runner = runner.with_sink(Arc::new(sink));
    }

    let summary = runner.run_templates(templates).await;
    print_summary(&config, &summary, args.show_rows);

    if summary.failed() > 0 {
        bail!("{} of {} queries failed", summary.failed(), summary.outcomes.len());
    }
    Ok(())
}

fn open_engine(config: &VeilConfig, args: &RunArgs) -> Result<Arc<dyn Engine>> {
    if args.dry_run {
        return Ok(Arc::new(ScriptedEngine::new()));
    }

    let database = config.engine.database.as_deref();
    let engine = DuckDbEngine::open(database)?;
    let mut session = engine.connect()?;
    schema::provision(session.as_mut())?;
    // An in-memory database starts empty; always give it rows.
    if args.sample || database.is_none() {
        schema::seed_sample(session.as_mut())?;
    }
    Ok(Arc::new(engine))
}

fn print_summary(config: &VeilConfig, summary: &RunSummary, show_rows: bool) {
    let mut table = styled_table(&[
        "Query", "Status", "Rows", "Resolve ms", "Rewrite ms", "Execute ms", "Lookups", "Applied",
    ]);

    for outcome in &summary.outcomes {
        match outcome {
            QueryOutcome::Completed(report) => {
                let status = match &report.outcome.suppression {
                    Some(reason) => format!("suppressed: {reason}"),
                    None => "ok".to_string(),
                };
                table.add_row(report_row(report, status, report.row_count().to_string()));
            }
            QueryOutcome::Failed {
                error,
                report: Some(report),
                ..
            } => {
                table.add_row(report_row(report, format!("failed: {error}"), String::new()));
            }
            QueryOutcome::Failed {
                query,
                error,
                report: None,
            } => {
                let mut row = vec![String::new(); 8];
                row[0] = query.to_string();
                row[1] = format!("failed: {error}");
                table.add_row(row);
            }
        }
    }
    println!("{table}");

    if show_rows {
        let executed = summary.outcomes.iter().filter_map(|outcome| match outcome {
            QueryOutcome::Completed(report) => report
                .execution
                .as_ref()
                .map(|execution| (report.query, &execution.rows)),
            QueryOutcome::Failed { .. } => None,
        });
        for (query, rows) in executed {
            println!();
            println!("{}", query.to_string().header());
            print_rows(rows);
        }
    }

    println!();
    print_labeled("model", config.run.model.as_str());
    print_labeled("subject", &config.run.subject);
    let line = format!(
        "{} executed, {} suppressed, {} failed, {} rows",
        summary.executed(),
        summary.suppressed(),
        summary.failed(),
        summary.total_rows()
    );
    if summary.failed() == 0 {
        print_success(&line);
    } else {
        println!("{} {}", "✗".error(), line);
    }
}

fn report_row(report: &CycleReport, status: String, rows: String) -> Vec<String> {
    vec![
        report.query.to_string(),
        status,
        rows,
        ms(report.resolve_elapsed),
        ms(report.rewrite_elapsed),
        ms(report.execute_elapsed),
        report.stats.lookups.to_string(),
        report.stats.applied_rules.to_string(),
    ]
}

fn ms(elapsed: Duration) -> String {
    format!("{:.2}", elapsed.as_secs_f64() * 1000.0)
}
