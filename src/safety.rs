//! Safety gate for generated and user-edited SQL.
//!
//! Every statement passes through [`SafetyGate::screen`] before it can run.
//! The gate classifies SQL as safe, or unsafe and blocked until the user
//! confirms it. The executor only accepts an [`ApprovedQuery`], which can only
//! be obtained from a [`GateDecision`].
//!
//! Detection is AST-based (sqlparser) with a keyword scan as fallback for SQL
//! the parser does not understand. Both are heuristics: statements disguised
//! through dialect quirks may still slip through.

use crate::error::{ExplorerError, ExplorerResult};
use crate::settings::SafetySettings;
use regex::Regex;
use serde::Serialize;
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Kind of unsafe operation detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsafeOperation {
    Drop,
    Truncate,
    Alter,
    DeleteWithoutWhere,
    UpdateWithoutWhere,
    /// Any statement that changes data while the gate runs in read-only mode
    Write,
}

impl UnsafeOperation {
    /// Get the operation name for messages.
    pub fn operation_name(&self) -> &'static str {
        match self {
            Self::Drop => "DROP",
            Self::Truncate => "TRUNCATE",
            Self::Alter => "ALTER",
            Self::DeleteWithoutWhere => "DELETE without WHERE",
            Self::UpdateWithoutWhere => "UPDATE without WHERE",
            Self::Write => "write statement",
        }
    }

    /// Get the reason why this operation is unsafe.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Drop => "This will permanently delete the object and its data",
            Self::Truncate => "This will remove all rows from the table",
            Self::Alter => "This will change the structure of the database",
            Self::DeleteWithoutWhere => "This will delete all rows from the table",
            Self::UpdateWithoutWhere => "This will update all rows in the table",
            Self::Write => "This will modify the database",
        }
    }
}

/// One unsafe statement found in the screened SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub operation: UnsafeOperation,
    /// 0-based position of the statement within the screened SQL
    pub statement_index: usize,
    pub reason: &'static str,
}

impl Finding {
    fn new(operation: UnsafeOperation, statement_index: usize) -> Self {
        Self {
            operation,
            statement_index,
            reason: operation.reason(),
        }
    }
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (statement {}): {}",
            self.operation.operation_name(),
            self.statement_index + 1,
            self.reason
        )
    }
}

/// Tri-state outcome of screening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "findings", rename_all = "snake_case")]
pub enum SafetyVerdict {
    Safe,
    /// Unsafe and not yet confirmed by the user
    Blocked(Vec<Finding>),
    /// Unsafe, explicitly confirmed by the user
    Confirmed(Vec<Finding>),
}

impl SafetyVerdict {
    pub fn is_safe(&self) -> bool {
        matches!(self, Self::Safe)
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked(_))
    }

    pub fn findings(&self) -> &[Finding] {
        match self {
            Self::Safe => &[],
            Self::Blocked(f) | Self::Confirmed(f) => f,
        }
    }

    /// Short label for display (`SAFE`, `UNSAFE-BLOCKED`, `UNSAFE-CONFIRMED`).
    pub fn label(&self) -> &'static str {
        match self {
            Self::Safe => "SAFE",
            Self::Blocked(_) => "UNSAFE-BLOCKED",
            Self::Confirmed(_) => "UNSAFE-CONFIRMED",
        }
    }
}

/// The gate's decision for a piece of SQL.
#[derive(Debug, Clone, Serialize)]
pub struct GateDecision {
    sql: String,
    verdict: SafetyVerdict,
}

impl GateDecision {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn verdict(&self) -> &SafetyVerdict {
        &self.verdict
    }

    /// Record the user's explicit confirmation. Only a blocked verdict changes.
    pub fn confirm(self) -> Self {
        let verdict = match self.verdict {
            SafetyVerdict::Blocked(findings) => SafetyVerdict::Confirmed(findings),
            other => other,
        };
        Self { verdict, ..self }
    }

    /// Turn the decision into something the executor will run.
    pub fn approve(&self) -> ExplorerResult<ApprovedQuery> {
        match &self.verdict {
            SafetyVerdict::Blocked(findings) => Err(ExplorerError::query_blocked(
                findings.iter().map(|f| f.to_string()).collect(),
            )),
            SafetyVerdict::Safe => Ok(ApprovedQuery {
                sql: self.sql.clone(),
                confirmed: false,
            }),
            SafetyVerdict::Confirmed(_) => Ok(ApprovedQuery {
                sql: self.sql.clone(),
                confirmed: true,
            }),
        }
    }
}

/// SQL that passed the gate, or was confirmed past it.
#[derive(Debug, Clone)]
pub struct ApprovedQuery {
    sql: String,
    confirmed: bool,
}

impl ApprovedQuery {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// True when the statement was unsafe and the user overrode the gate.
    pub fn was_confirmed(&self) -> bool {
        self.confirmed
    }
}

/// Classifier for destructive SQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafetyGate {
    read_only: bool,
}

impl SafetyGate {
    pub fn new(read_only: bool) -> Self {
        Self { read_only }
    }

    pub fn from_settings(settings: &SafetySettings) -> Self {
        Self::new(settings.read_only)
    }

    /// Screen SQL and return the gate's decision.
    ///
    /// # Examples
    ///
    /// ```
    /// use sql_explorer::safety::SafetyGate;
    ///
    /// let gate = SafetyGate::default();
    /// assert!(gate.screen("SELECT * FROM orders").unwrap().verdict().is_safe());
    /// assert!(gate.screen("DELETE FROM orders").unwrap().verdict().is_blocked());
    /// assert!(gate.screen("DELETE FROM orders WHERE id = 5").unwrap().verdict().is_safe());
    /// ```
    pub fn screen(&self, sql: &str) -> ExplorerResult<GateDecision> {
        let sql = sql.trim();
        if sql.is_empty() || sql.chars().all(|c| c == ';' || c.is_whitespace()) {
            return Err(ExplorerError::invalid_input("Empty SQL statement"));
        }

        let findings = match Parser::parse_sql(&GenericDialect {}, sql) {
            Ok(statements) => self.check_statements(&statements),
            Err(e) => {
                debug!(error = %e, "SQL did not parse, falling back to keyword scan");
                self.scan_keywords(sql)
            }
        };

        let verdict = if findings.is_empty() {
            SafetyVerdict::Safe
        } else {
            warn!(
                findings = findings.len(),
                first = findings[0].operation.operation_name(),
                "Unsafe SQL blocked pending confirmation"
            );
            SafetyVerdict::Blocked(findings)
        };

        Ok(GateDecision {
            sql: sql.to_string(),
            verdict,
        })
    }

    fn check_statements(&self, statements: &[Statement]) -> Vec<Finding> {
        statements
            .iter()
            .enumerate()
            .filter_map(|(idx, stmt)| {
                check_statement_unsafe(stmt)
                    .or_else(|| (self.read_only && !only_reads(stmt)).then_some(UnsafeOperation::Write))
                    .map(|op| Finding::new(op, idx))
            })
            .collect()
    }

    fn scan_keywords(&self, sql: &str) -> Vec<Finding> {
        sql.split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .enumerate()
            .filter_map(|(idx, stmt)| {
                scan_statement(stmt)
                    .or_else(|| {
                        (self.read_only && !READ_PREFIX.is_match(stmt))
                            .then_some(UnsafeOperation::Write)
                    })
                    .map(|op| Finding::new(op, idx))
            })
            .collect()
    }
}

/// Whether a parsed statement produces a result set.
///
/// Data-modifying statements count only when they carry a `RETURNING` clause.
pub fn returns_rows(stmt: &Statement) -> bool {
    match stmt {
        Statement::Query(query) => match query.body.as_ref() {
            SetExpr::Insert(inner)
            | SetExpr::Update(inner)
            | SetExpr::Delete(inner)
            | SetExpr::Merge(inner) => returns_rows(inner),
            _ => true,
        },
        Statement::Insert(insert) => insert.returning.is_some(),
        Statement::Update(update) => update.returning.is_some(),
        Statement::Delete(delete) => delete.returning.is_some(),
        other => matches!(
            other,
            Statement::Explain { .. }
                | Statement::ExplainTable { .. }
                | Statement::ShowTables { .. }
                | Statement::ShowColumns { .. }
                | Statement::ShowDatabases { .. }
                | Statement::ShowSchemas { .. }
                | Statement::ShowVariable { .. }
                | Statement::ShowVariables { .. }
                | Statement::Pragma { .. }
        ),
    }
}

/// Row-returning statements that change nothing.
fn only_reads(stmt: &Statement) -> bool {
    match stmt {
        Statement::Insert(_) | Statement::Update(_) | Statement::Delete(_) => false,
        Statement::Query(query) => !query_writes(query),
        other => returns_rows(other),
    }
}

fn query_writes(query: &Query) -> bool {
    query
        .with
        .iter()
        .flat_map(|with| &with.cte_tables)
        .any(|cte| query_writes(&cte.query))
        || set_expr_writes(&query.body)
}

fn set_expr_writes(body: &SetExpr) -> bool {
    match body {
        SetExpr::Insert(_) | SetExpr::Update(_) | SetExpr::Delete(_) | SetExpr::Merge(_) => true,
        SetExpr::SetOperation { left, right, .. } => set_expr_writes(left) || set_expr_writes(right),
        SetExpr::Query(query) => query_writes(query),
        _ => false,
    }
}

/// Check if a single statement is unsafe.
fn check_statement_unsafe(stmt: &Statement) -> Option<UnsafeOperation> {
    match stmt {
        Statement::Query(query) => check_query(query),
        Statement::Truncate { .. } => Some(UnsafeOperation::Truncate),
        Statement::Delete(delete) if delete.selection.is_none() => {
            Some(UnsafeOperation::DeleteWithoutWhere)
        }
        Statement::Update(update) if update.selection.is_none() => {
            Some(UnsafeOperation::UpdateWithoutWhere)
        }
        Statement::Delete(_) | Statement::Update(_) => None,
        // DROP and ALTER come in many statement variants (table, view, index,
        // function, role, ...); the rendered statement always leads with the keyword.
        other => match leading_keyword(&other.to_string()).as_str() {
            "DROP" => Some(UnsafeOperation::Drop),
            "ALTER" => Some(UnsafeOperation::Alter),
            _ => None,
        },
    }
}

/// `WITH ... DELETE` parses as a query wrapping the statement, and CTE
/// bodies may themselves modify data.
fn check_query(query: &Query) -> Option<UnsafeOperation> {
    query
        .with
        .iter()
        .flat_map(|with| &with.cte_tables)
        .find_map(|cte| check_query(&cte.query))
        .or_else(|| check_set_expr(&query.body))
}

fn check_set_expr(body: &SetExpr) -> Option<UnsafeOperation> {
    match body {
        SetExpr::Delete(inner) | SetExpr::Update(inner) => check_statement_unsafe(inner),
        SetExpr::SetOperation { left, right, .. } => {
            check_set_expr(left).or_else(|| check_set_expr(right))
        }
        SetExpr::Query(query) => check_query(query),
        _ => None,
    }
}

fn leading_keyword(rendered: &str) -> String {
    rendered
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase()
}

static DESTRUCTIVE_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(DROP|TRUNCATE|ALTER)\b").expect("valid regex")
});
static DELETE_OR_UPDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(DELETE|UPDATE)\b").expect("valid regex")
});
static WHERE_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bWHERE\b").expect("valid regex"));
static READ_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(SELECT|WITH|EXPLAIN|SHOW|PRAGMA|VALUES|DESCRIBE)\b")
        .expect("valid regex")
});

/// Keyword scan of one statement for SQL the parser rejected.
fn scan_statement(stmt: &str) -> Option<UnsafeOperation> {
    if let Some(m) = DESTRUCTIVE_KEYWORD.captures(stmt).and_then(|c| c.get(1)) {
        return match m.as_str().to_ascii_uppercase().as_str() {
            "DROP" => Some(UnsafeOperation::Drop),
            "TRUNCATE" => Some(UnsafeOperation::Truncate),
            _ => Some(UnsafeOperation::Alter),
        };
    }

    let verb = DELETE_OR_UPDATE
        .captures(stmt)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_ascii_uppercase())?;
    if WHERE_CLAUSE.is_match(stmt) {
        return None;
    }
    if verb == "DELETE" {
        Some(UnsafeOperation::DeleteWithoutWhere)
    } else {
        Some(UnsafeOperation::UpdateWithoutWhere)
    }
}
