//! Runs rewritten statements against an engine session.

use std::time::{Duration, Instant};

use tracing::debug;
use veil_query::{FinalStatement, StatementKind};

use crate::engine::Rows;
use crate::error::Result;
use crate::views::ViewScope;

/// What one execution produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionReport {
    /// Rows of the last result-producing statement.
    pub rows: Rows,
    pub row_count: usize,
    pub elapsed: Duration,
}

/// Runs `statements` strictly in order.
///
/// Supporting relations created by a statement are recorded in the scope's
/// ledger as soon as they exist, and forgotten once a later statement drops
/// them. Engine errors are returned unchanged.
pub fn execute(scope: &mut ViewScope, statements: &[FinalStatement]) -> Result<ExecutionReport> {
    let start = Instant::now();
    let mut rows = Rows::default();

    for statement in statements {
        scope.ensure_live()?;
        match &statement.kind {
            StatementKind::Query => {
                rows = scope.session().query(&statement.sql)?;
                debug!(rows = rows.len(), "Statement returned");
            }
            StatementKind::CreateRelation(name) => {
                scope.create_relation(name, &statement.sql)?;
            }
            StatementKind::DropRelation(name) => {
                scope.session().execute(&statement.sql)?;
                scope.forget(name);
            }
        }
    }

    Ok(ExecutionReport {
        row_count: rows.len(),
        rows,
        elapsed: start.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::engine::{Engine, ScriptedEngine};
    use crate::error::CycleError;
    use crate::views::ViewLedger;

    fn statement(sql: &str, kind: StatementKind) -> FinalStatement {
        FinalStatement {
            sql: sql.to_string(),
            kind,
        }
    }

    #[test]
    fn test_statements_run_in_order() {
        let engine = ScriptedEngine::new();
        let ledger = Arc::new(ViewLedger::new());
        let mut scope = ViewScope::new(engine.connect().unwrap(), Arc::clone(&ledger));

        let statements = [
            statement(
                "create view r as select 1 as a",
                StatementKind::CreateRelation("r".to_string()),
            ),
            statement("select a from r", StatementKind::Query),
            statement("drop view r", StatementKind::DropRelation("r".to_string())),
        ];
        execute(&mut scope, &statements).unwrap();

        assert_eq!(
            engine.statements(),
            vec!["create view r as select 1 as a", "select a from r", "drop view r"]
        );
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_failed_query_leaves_relation_recorded() {
        let engine = ScriptedEngine::new().fail_when("select a");
        let ledger = Arc::new(ViewLedger::new());
        let mut scope = ViewScope::new(engine.connect().unwrap(), Arc::clone(&ledger));

        let statements = [
            statement(
                "create view r as select 1 as a",
                StatementKind::CreateRelation("r".to_string()),
            ),
            statement("select a from r", StatementKind::Query),
            statement("drop view r", StatementKind::DropRelation("r".to_string())),
        ];
        let err = execute(&mut scope, &statements).unwrap_err();
        assert!(matches!(err, CycleError::Execution(_)));
        assert_eq!(ledger.names(), vec!["r"]);

        drop(scope);
        assert!(engine.live_relations().is_empty());
    }
}
