//! Per-query metrics records and where they go.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::info;
use veil_types::{AccessModel, QueryId};

use crate::error::MetricsError;

/// One record per query cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetrics {
    #[serde(serialize_with = "serialize_query_id")]
    pub query_id: QueryId,
    pub model: AccessModel,
    pub resolve_duration_ms: f64,
    pub rewrite_duration_ms: f64,
    pub execute_duration_ms: f64,
    pub policy_lookup_count: u32,
    pub applied_rule_count: u32,
    pub row_count: usize,
    pub suppressed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suppression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn serialize_query_id<S: serde::Serializer>(id: &QueryId, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(id)
}

impl QueryMetrics {
    /// A record for a query that failed before producing timings.
    pub fn failed(query_id: QueryId, model: AccessModel, error: String) -> Self {
        Self {
            query_id,
            model,
            resolve_duration_ms: 0.0,
            rewrite_duration_ms: 0.0,
            execute_duration_ms: 0.0,
            policy_lookup_count: 0,
            applied_rule_count: 0,
            row_count: 0,
            suppressed: false,
            suppression: None,
            error: Some(error),
        }
    }
}

/// Receives metrics records.
pub trait MetricsSink: Send + Sync {
    fn record(&self, metrics: &QueryMetrics) -> Result<(), MetricsError>;
}

/// Logs each record as a structured event.
#[derive(Debug, Default)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn record(&self, m: &QueryMetrics) -> Result<(), MetricsError> {
        info!(
            query = %m.query_id,
            model = %m.model,
            resolve_ms = m.resolve_duration_ms,
            rewrite_ms = m.rewrite_duration_ms,
            execute_ms = m.execute_duration_ms,
            lookups = m.policy_lookup_count,
            applied = m.applied_rule_count,
            rows = m.row_count,
            suppressed = m.suppressed,
            "Query metrics"
        );
        Ok(())
    }
}

/// Appends each record as one JSON line.
#[derive(Debug)]
pub struct JsonLinesSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Opens `path` for appending, creating it if needed.
    pub fn open(path: &Path) -> Result<Self, MetricsError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl MetricsSink for JsonLinesSink {
    fn record(&self, metrics: &QueryMetrics) -> Result<(), MetricsError> {
        let line = serde_json::to_string(metrics)?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<QueryMetrics>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<QueryMetrics> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl MetricsSink for MemorySink {
    fn record(&self, metrics: &QueryMetrics) -> Result<(), MetricsError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(metrics.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> QueryMetrics {
        QueryMetrics {
            query_id: QueryId::new(6),
            model: AccessModel::Rbac,
            resolve_duration_ms: 0.5,
            rewrite_duration_ms: 0.25,
            execute_duration_ms: 3.0,
            policy_lookup_count: 2,
            applied_rule_count: 1,
            row_count: 1,
            suppressed: false,
            suppression: None,
            error: None,
        }
    }

    #[test]
    fn test_record_field_names() {
        let json: serde_json::Value = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["queryId"], "Q6");
        assert_eq!(json["model"], "rbac");
        assert_eq!(json["policyLookupCount"], 2);
        assert_eq!(json["appliedRuleCount"], 1);
        assert_eq!(json["suppressed"], false);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_json_lines_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metrics.jsonl");

        let sink = JsonLinesSink::open(&path).unwrap();
        sink.record(&sample()).unwrap();
        drop(sink);
        let sink = JsonLinesSink::open(&path).unwrap();
        sink.record(&QueryMetrics::failed(
            QueryId::new(7),
            AccessModel::Abac,
            "timeout".to_string(),
        ))
        .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("\"error\":\"timeout\""));
    }

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemorySink::new();
        sink.record(&sample()).unwrap();
        sink.record(&QueryMetrics::failed(
            QueryId::new(1),
            AccessModel::Abac,
            "x".to_string(),
        ))
        .unwrap();
        let ids: Vec<_> = sink.records().iter().map(|m| m.query_id).collect();
        assert_eq!(ids, vec![QueryId::new(6), QueryId::new(1)]);
    }
}
