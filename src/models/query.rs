//! Query-related data models.
//!
//! This module defines the generated query record and execution results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Default row limit for query results.
pub const DEFAULT_ROW_LIMIT: u32 = 1000;

/// Maximum allowed row limit.
pub const MAX_ROW_LIMIT: u32 = 10000;

/// Default query timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// SQL produced by the language model for one question. Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedQuery {
    pub id: Uuid,
    pub question: String,
    pub sql: String,
    /// Fragment ids that were placed into the prompt, in rank order
    pub retrieved_fragment_ids: Vec<String>,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

impl GeneratedQuery {
    pub fn new(
        question: impl Into<String>,
        sql: impl Into<String>,
        retrieved_fragment_ids: Vec<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            question: question.into(),
            sql: sql.into(),
            retrieved_fragment_ids,
            model: model.into(),
            created_at: Utc::now(),
        }
    }
}

/// Rows and timing returned by the executor. Display-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    pub row_count: usize,
    /// Wall-clock time spent in the database
    pub elapsed_ms: u64,
    /// True when more rows were available than the row limit
    pub truncated: bool,
    /// Set for statements that do not return rows
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
}

impl ExecutionResult {
    /// Create a result for statements that return rows.
    pub fn rows(
        columns: Vec<String>,
        rows: Vec<serde_json::Map<String, JsonValue>>,
        elapsed_ms: u64,
        truncated: bool,
    ) -> Self {
        Self {
            columns,
            row_count: rows.len(),
            rows,
            elapsed_ms,
            truncated,
            rows_affected: None,
        }
    }

    /// Create a result for write operations (INSERT/UPDATE/DELETE).
    pub fn write_result(rows_affected: u64, elapsed_ms: u64) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
            elapsed_ms,
            truncated: false,
            rows_affected: Some(rows_affected),
        }
    }

    /// Check if the result is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.rows_affected.is_none()
    }
}
