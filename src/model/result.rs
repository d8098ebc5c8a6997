//! Ingested run results and their summary projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metric groups lifted out of a raw controller result.
///
/// Each group is a JSON object; a group the controller did not report is an
/// empty object rather than absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    #[serde(default)]
    pub throughput: Map<String, Value>,
    #[serde(default)]
    pub latency: Map<String, Value>,
    #[serde(default)]
    pub strikes: Map<String, Value>,
    #[serde(default)]
    pub transactions: Map<String, Value>,
}

impl ResultSummary {
    /// Derive the summary from a raw result shaped like `{"metrics": {"throughput": {...}, ...}}`.
    pub fn from_raw(raw: &Value) -> Self {
        let metrics = raw.get("metrics");
        let group = |name: &str| -> Map<String, Value> {
            metrics
                .and_then(|m| m.get(name))
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default()
        };

        Self {
            throughput: group("throughput"),
            latency: group("latency"),
            strikes: group("strikes"),
            transactions: group("transactions"),
        }
    }
}

/// The stored result of a run. At most one exists per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub id: i64,
    pub test_run_id: i64,
    pub result_data: Value,
    pub summary: ResultSummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
