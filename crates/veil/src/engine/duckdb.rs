//! Embedded DuckDB adapter.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use duckdb::Connection;
use duckdb::types::ValueRef;

use super::{Engine, EngineError, Rows, Session, Value};

/// DuckDB, either file-backed or in memory.
///
/// Sessions are cloned from one root connection, so every session of an
/// in-memory engine sees the same database.
pub struct DuckDbEngine {
    root: Mutex<Connection>,
}

impl DuckDbEngine {
    /// Opens the database at `path`, or an in-memory database when `None`.
    pub fn open(path: Option<&Path>) -> Result<Self, EngineError> {
        let conn = match path {
            Some(path) => Connection::open(path),
            None => Connection::open_in_memory(),
        }
        .map_err(|e| EngineError::Connect {
            engine: "duckdb",
            source: e.into(),
        })?;

        Ok(Self {
            root: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, EngineError> {
        Self::open(None)
    }
}

impl std::fmt::Debug for DuckDbEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbEngine").finish_non_exhaustive()
    }
}

impl Engine for DuckDbEngine {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn connect(&self) -> Result<Box<dyn Session>, EngineError> {
        let root = self.root.lock().unwrap_or_else(PoisonError::into_inner);
        let conn = root.try_clone().map_err(|e| EngineError::Connect {
            engine: "duckdb",
            source: e.into(),
        })?;
        Ok(Box::new(DuckDbSession { conn }))
    }
}

struct DuckDbSession {
    conn: Connection,
}

impl DuckDbSession {
    fn convert_value(value: ValueRef<'_>) -> Value {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Boolean(b) => Value::Boolean(b),
            ValueRef::TinyInt(i) => Value::Integer(i64::from(i)),
            ValueRef::SmallInt(i) => Value::Integer(i64::from(i)),
            ValueRef::Int(i) => Value::Integer(i64::from(i)),
            ValueRef::BigInt(i) => Value::Integer(i),
            ValueRef::HugeInt(i) => i64::try_from(i).map_or_else(
                |_| {
                    #[allow(clippy::cast_precision_loss)]
                    let real = i as f64;
                    Value::Real(real)
                },
                Value::Integer,
            ),
            ValueRef::UTinyInt(i) => Value::Integer(i64::from(i)),
            ValueRef::USmallInt(i) => Value::Integer(i64::from(i)),
            ValueRef::UInt(i) => Value::Integer(i64::from(i)),
            ValueRef::UBigInt(i) => i64::try_from(i).map_or_else(
                |_| {
                    #[allow(clippy::cast_precision_loss)]
                    let real = i as f64;
                    Value::Real(real)
                },
                Value::Integer,
            ),
            ValueRef::Float(f) => Value::Real(f64::from(f)),
            ValueRef::Double(f) => Value::Real(f),
            ValueRef::Decimal(d) => {
                let text = d.to_string();
                text.parse::<f64>()
                    .map_or_else(|_| Value::Text(text), Value::Real)
            }
            // Timestamps keep their raw unit count.
            ValueRef::Timestamp(_, t) => Value::Integer(t),
            ValueRef::Text(s) => Value::Text(String::from_utf8_lossy(s).to_string()),
            ValueRef::Date32(d) => Value::Date(d),
            _ => Value::Null,
        }
    }
}

impl Session for DuckDbSession {
    fn execute(&mut self, sql: &str) -> Result<(), EngineError> {
        self.conn
            .execute(sql, [])
            .map_err(|e| EngineError::statement(sql, e))?;
        Ok(())
    }

    fn query(&mut self, sql: &str) -> Result<Rows, EngineError> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| EngineError::statement(sql, e))?;

        let mut result = stmt.query([]).map_err(|e| EngineError::statement(sql, e))?;

        let columns = result
            .as_ref()
            .map(duckdb::Statement::column_names)
            .unwrap_or_default();
        let column_count = columns.len();

        let mut rows = Vec::new();
        while let Some(row) = result.next().map_err(|e| EngineError::statement(sql, e))? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let value_ref = row.get_ref(i).map_err(|e| EngineError::statement(sql, e))?;
                values.push(Self::convert_value(value_ref));
            }
            rows.push(values);
        }

        Ok(Rows { columns, rows })
    }

    fn relation_exists(&mut self, name: &str) -> Result<bool, EngineError> {
        let sql = "select count(*) from information_schema.tables where table_name = ?";
        let count: i64 = self
            .conn
            .query_row(sql, [name], |row| row.get(0))
            .map_err(|e| EngineError::statement(sql, e))?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sessions_share_in_memory_database() {
        let engine = DuckDbEngine::in_memory().unwrap();
        let mut first = engine.connect().unwrap();
        first.execute("create table t (a integer)").unwrap();
        first.execute("insert into t values (1), (2)").unwrap();

        let mut second = engine.connect().unwrap();
        let rows = second.query("select a from t order by a").unwrap();
        assert_eq!(rows.columns, vec!["a"]);
        assert_eq!(rows.rows, vec![vec![Value::Integer(1)], vec![Value::Integer(2)]]);
    }

    #[test]
    fn test_relation_exists_sees_views() {
        let engine = DuckDbEngine::in_memory().unwrap();
        let mut session = engine.connect().unwrap();
        session.execute("create table t (a integer)").unwrap();
        assert!(!session.relation_exists("v").unwrap());
        session.execute("create view v as select * from t").unwrap();
        assert!(session.relation_exists("v").unwrap());
        session.execute("drop view if exists v").unwrap();
        assert!(!session.relation_exists("v").unwrap());
    }

    #[test]
    fn test_engine_error_is_surfaced() {
        let engine = DuckDbEngine::in_memory().unwrap();
        let mut session = engine.connect().unwrap();
        let err = session.query("select * from missing_table").unwrap_err();
        assert!(matches!(err, EngineError::Statement { ref sql, .. } if sql.contains("missing_table")));
    }

    #[test]
    fn test_decimal_becomes_real() {
        let engine = DuckDbEngine::in_memory().unwrap();
        let mut session = engine.connect().unwrap();
        let rows = session.query("select cast(12.50 as decimal(15,2)) as d").unwrap();
        assert_eq!(rows.rows[0][0], Value::Real(12.5));
    }
}
