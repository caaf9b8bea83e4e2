//! `veil rewrite`

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use veil::{Catalog, QueryId, ScriptedEngine, StatementKind};

use super::{PolicyArgs, build_cycle, load_config};
use crate::style::{SemanticStyle, print_labeled, print_warn, styled_table};

pub async fn run(project: &Path, query: u32, policy: &PolicyArgs) -> Result<()> {
    let config = load_config(project, policy)?;
    let catalog = Catalog::tpch()?;
    let template = catalog
        .get(QueryId::new(query))
        .with_context(|| format!("No query template Q{query} (expected 1-22)"))?;

    // Planning never reaches the engine.
    let cycle = build_cycle(&config, Arc::new(ScriptedEngine::new()), policy.audit)?;
    let report = cycle.plan(template).await?;

    println!("{}", format!("{} ({})", report.query, template.class()).header());
    print_labeled("model", report.model.as_str());
    print_labeled("subject", &config.run.subject);
    print_labeled("lookups", &report.stats.lookups.to_string());
    print_labeled("applied rules", &report.stats.applied_rules.to_string());
    println!();

    let mut table = styled_table(&["Item", "Granted", "Condition"]);
    for item in template.item_ids() {
        let granted = report.decision.is_granted(&item);
        let condition = report
            .decision
            .condition(&item)
            .map_or_else(String::new, ToString::to_string);
        table.add_row(vec![
            item.to_string(),
            if granted { "yes" } else { "no" }.to_string(),
            condition,
        ]);
    }
    println!("{table}");

    if let Some(suppression) = &report.outcome.suppression {
        print_warn(&format!("Suppressed: {suppression}"));
        return Ok(());
    }

    for view in &report.outcome.supporting_views {
        println!();
        println!("{}", format!("-- view {}", view.name).muted());
        println!("{};", view.create_sql().code());
    }
    for statement in &report.outcome.final_statements {
        let label = match &statement.kind {
            StatementKind::Query => "query".to_string(),
            StatementKind::CreateRelation(name) => format!("create {name}"),
            StatementKind::DropRelation(name) => format!("drop {name}"),
        };
        println!();
        println!("{}", format!("-- {label}").muted());
        println!("{};", statement.sql.code());
    }
    Ok(())
}
