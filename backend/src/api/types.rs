//! REST API types.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::transform::pipeline::{RunResult, Selection};
use crate::warehouse::StoredTable;

/// Body of `POST /api/run`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub select: Selection,
}

/// Response of `POST /api/run`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    /// "success" or "error"
    pub status: &'static str,
    pub run: RunResult,
}

impl From<RunResult> for RunResponse {
    fn from(run: RunResult) -> Self {
        Self {
            status: if run.succeeded() { "success" } else { "error" },
            run,
        }
    }
}

/// Rows of a relation plus its metadata
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableResponse<R> {
    pub relation: String,
    pub materialized_at: String,
    pub row_count: usize,
    pub rows: Vec<R>,
}

impl<R> From<StoredTable<R>> for TableResponse<R> {
    fn from(table: StoredTable<R>) -> Self {
        Self {
            relation: table.relation.to_string(),
            materialized_at: table.materialized_at,
            row_count: table.row_count,
            rows: table.rows,
        }
    }
}

/// Create an error response body
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
    })
}
