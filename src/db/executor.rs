//! Query execution engine.
//!
//! Runs SQL that has passed the safety gate against the active connection:
//! - Row limits (enforced via streaming - only fetches needed rows)
//! - Query timeouts
//! - Wall-clock timing
//!
//! Driver errors are surfaced with the database's own message.

use crate::db::pool::DbPool;
use crate::db::types::RowToJson;
use crate::error::{ExplorerError, ExplorerResult};
use crate::models::{DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_ROW_LIMIT, ExecutionResult, MAX_ROW_LIMIT};
use crate::safety::{ApprovedQuery, returns_rows};
use crate::settings::ExecutorSettings;
use futures_util::StreamExt;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Query executor that handles database query execution.
#[derive(Debug, Clone)]
pub struct Executor {
    timeout: Duration,
    row_limit: u32,
}

impl Executor {
    /// Create an executor with custom settings.
    pub fn new(timeout_secs: u64, row_limit: u32) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
            // limit=0 would mark every non-empty result as truncated
            row_limit: row_limit.clamp(1, MAX_ROW_LIMIT),
        }
    }

    pub fn from_settings(settings: &ExecutorSettings) -> Self {
        Self::new(settings.timeout_secs, settings.row_limit)
    }

    pub fn row_limit(&self) -> u32 {
        self.row_limit
    }

    /// Execute approved SQL and return rows or the affected row count.
    pub async fn execute(
        &self,
        pool: &DbPool,
        query: &ApprovedQuery,
    ) -> ExplorerResult<ExecutionResult> {
        let sql = query.sql();
        let start = Instant::now();

        debug!(
            sql = %sql,
            limit = self.row_limit,
            timeout_secs = self.timeout.as_secs(),
            confirmed = query.was_confirmed(),
            "Executing statement"
        );

        let result = if statement_returns_rows(sql) {
            match pool {
                DbPool::Postgres(p) => {
                    let rows = postgres::fetch_rows(p, sql, self.row_limit, self.timeout).await?;
                    let columns = match rows.first() {
                        Some(first) => first.column_names(),
                        None => postgres::describe_columns(p, sql).await,
                    };
                    process_rows(columns, rows, self.row_limit, start)
                }
                DbPool::SQLite(p) => {
                    let rows = sqlite::fetch_rows(p, sql, self.row_limit, self.timeout).await?;
                    let columns = match rows.first() {
                        Some(first) => first.column_names(),
                        None => sqlite::describe_columns(p, sql).await,
                    };
                    process_rows(columns, rows, self.row_limit, start)
                }
            }
        } else {
            let rows_affected = match pool {
                DbPool::Postgres(p) => postgres::execute_write(p, sql, self.timeout).await?,
                DbPool::SQLite(p) => sqlite::execute_write(p, sql, self.timeout).await?,
            };
            ExecutionResult::write_result(rows_affected, start.elapsed().as_millis() as u64)
        };

        info!(
            rows = result.row_count,
            rows_affected = ?result.rows_affected,
            elapsed_ms = result.elapsed_ms,
            "Statement executed"
        );
        Ok(result)
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_ROW_LIMIT)
    }
}

/// Queries, and anything the parser does not understand, are fetched as rows.
fn statement_returns_rows(sql: &str) -> bool {
    match Parser::parse_sql(&GenericDialect {}, sql) {
        Ok(statements) => statements.last().is_none_or(returns_rows),
        Err(_) => true,
    }
}

/// Process fetched rows into an ExecutionResult.
fn process_rows<R: RowToJson>(
    columns: Vec<String>,
    rows: Vec<R>,
    row_limit: u32,
    start: Instant,
) -> ExecutionResult {
    let elapsed_ms = start.elapsed().as_millis() as u64;
    let total_rows = rows.len();
    let truncated = total_rows > row_limit as usize;

    let json_rows = rows
        .iter()
        .take(row_limit as usize)
        .map(|r| r.to_json_map())
        .collect();

    if truncated {
        warn!(limit = row_limit, "Query result truncated");
    }

    ExecutionResult::rows(columns, json_rows, elapsed_ms, truncated)
}

// =============================================================================
// Common Helper Functions
// =============================================================================

fn collect_rows<R>(results: Vec<Result<R, sqlx::Error>>) -> ExplorerResult<Vec<R>> {
    let mut rows = Vec::with_capacity(results.len());
    for result in results {
        rows.push(result.map_err(driver_error)?);
    }
    Ok(rows)
}

/// Every driver error is an execution failure carrying the raw message.
fn driver_error(err: sqlx::Error) -> ExplorerError {
    match err {
        sqlx::Error::Database(db_err) => ExplorerError::execution(
            db_err.message().to_string(),
            db_err.code().map(|c| c.to_string()),
        ),
        other => ExplorerError::execution(other.to_string(), None),
    }
}

fn timeout_error(operation: &str, timeout: Duration) -> ExplorerError {
    ExplorerError::timeout(operation, timeout.as_secs())
}

/// Column names of a prepared statement, for results with no rows to read them from.
fn statement_columns<'q, S: sqlx::Statement<'q>>(
    prepared: Result<S, sqlx::Error>,
) -> Vec<String> {
    use sqlx::Column;
    match prepared {
        Ok(statement) => statement
            .columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect(),
        Err(e) => {
            debug!(error = %e, "Could not describe result columns");
            Vec::new()
        }
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use sqlx::PgPool;
    use sqlx::postgres::PgRow;

    pub async fn fetch_rows(
        pool: &PgPool,
        sql: &str,
        row_limit: u32,
        query_timeout: Duration,
    ) -> ExplorerResult<Vec<PgRow>> {
        use sqlx::Executor;
        let fetch_limit = row_limit as usize + 1;
        let rows_future = pool.fetch(sql).take(fetch_limit).collect::<Vec<_>>();

        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }

    pub async fn describe_columns(pool: &PgPool, sql: &str) -> Vec<String> {
        use sqlx::Executor;
        statement_columns(pool.prepare(sql).await)
    }

    pub async fn execute_write(
        pool: &PgPool,
        sql: &str,
        query_timeout: Duration,
    ) -> ExplorerResult<u64> {
        use sqlx::Executor;
        match timeout(query_timeout, pool.execute(sql)).await {
            Ok(Ok(r)) => Ok(r.rows_affected()),
            Ok(Err(e)) => Err(driver_error(e)),
            Err(_) => Err(timeout_error("statement execution", query_timeout)),
        }
    }
}

mod sqlite {
    use super::*;
    use sqlx::SqlitePool;
    use sqlx::sqlite::SqliteRow;

    pub async fn fetch_rows(
        pool: &SqlitePool,
        sql: &str,
        row_limit: u32,
        query_timeout: Duration,
    ) -> ExplorerResult<Vec<SqliteRow>> {
        use sqlx::Executor;
        let fetch_limit = row_limit as usize + 1;
        let rows_future = pool.fetch(sql).take(fetch_limit).collect::<Vec<_>>();

        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }

    pub async fn describe_columns(pool: &SqlitePool, sql: &str) -> Vec<String> {
        use sqlx::Executor;
        statement_columns(pool.prepare(sql).await)
    }

    pub async fn execute_write(
        pool: &SqlitePool,
        sql: &str,
        query_timeout: Duration,
    ) -> ExplorerResult<u64> {
        use sqlx::Executor;
        match timeout(query_timeout, pool.execute(sql)).await {
            Ok(Ok(r)) => Ok(r.rows_affected()),
            Ok(Err(e)) => Err(driver_error(e)),
            Err(_) => Err(timeout_error("statement execution", query_timeout)),
        }
    }
}
