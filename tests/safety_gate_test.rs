//! Integration tests for the safety gate in front of a real database.
//!
//! Unsafe statements must never reach the database until confirmed, and a
//! confirmed statement runs exactly as written.

use async_trait::async_trait;
use sql_explorer::db::DbPool;
use sql_explorer::embedding::HashingEmbedder;
use sql_explorer::error::{ExplorerError, ExplorerResult};
use sql_explorer::llm::LanguageModel;
use sql_explorer::models::ConnectionTarget;
use sql_explorer::safety::{SafetyGate, SafetyVerdict, UnsafeOperation};
use sql_explorer::{Session, Settings};
use std::sync::Arc;
use tempfile::TempDir;

struct FixedModel(&'static str);

#[async_trait]
impl LanguageModel for FixedModel {
    fn model_name(&self) -> &str {
        "fixed"
    }

    async fn complete(&self, _prompt: &str) -> ExplorerResult<String> {
        Ok(self.0.to_string())
    }
}

/// A session connected to a file database with three students.
async fn setup(dir: &TempDir, reply: &'static str) -> Session {
    let url = format!("sqlite:{}?mode=rwc", dir.path().join("school.db").display());
    let target = ConnectionTarget::parse(&url).unwrap();

    let pool = DbPool::connect(&target).await.unwrap();
    let DbPool::SQLite(sqlite) = &pool else {
        panic!("expected a SQLite pool");
    };
    sqlx::query("CREATE TABLE students (id INTEGER PRIMARY KEY, name TEXT NOT NULL, grade INTEGER)")
        .execute(sqlite)
        .await
        .unwrap();
    sqlx::query("INSERT INTO students (name, grade) VALUES ('Ada', 9), ('Alan', 10), ('Grace', 11)")
        .execute(sqlite)
        .await
        .unwrap();
    pool.close().await;

    let mut settings = Settings::default();
    settings.index.dir = dir.path().join("index");
    let mut session = Session::new(
        Arc::new(settings),
        Arc::new(HashingEmbedder::new(256)),
        Arc::new(FixedModel(reply)),
    );
    session.connect(target).await.unwrap();
    session
}

async fn student_count(session: &Session) -> i64 {
    let approved = session
        .screen("SELECT COUNT(*) AS n FROM students")
        .unwrap()
        .approve()
        .unwrap();
    let result = session.execute(&approved).await.unwrap();
    result.rows[0]["n"].as_i64().unwrap()
}

// =========================================================================
// Classification
// =========================================================================

#[test]
fn test_gate_examples() {
    let gate = SafetyGate::default();

    assert_eq!(
        gate.screen("SELECT * FROM orders").unwrap().verdict(),
        &SafetyVerdict::Safe
    );
    assert!(gate.screen("DELETE FROM orders").unwrap().verdict().is_blocked());
    assert_eq!(
        gate.screen("DELETE FROM orders WHERE id = 5").unwrap().verdict(),
        &SafetyVerdict::Safe
    );
    let drop = gate.screen("DROP TABLE customers").unwrap();
    assert_eq!(drop.verdict().findings()[0].operation, UnsafeOperation::Drop);
}

#[test]
fn test_unsafe_statement_hidden_after_safe_one() {
    let gate = SafetyGate::default();
    let decision = gate
        .screen("SELECT * FROM students; -- cleanup\nUPDATE students SET grade = 0")
        .unwrap();

    let findings = decision.verdict().findings();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].operation, UnsafeOperation::UpdateWithoutWhere);
    assert_eq!(findings[0].statement_index, 1);
}

#[test]
fn test_lowercase_and_comments_do_not_hide_drop() {
    let gate = SafetyGate::default();
    assert!(
        gate.screen("/* tidy up */ drop table students")
            .unwrap()
            .verdict()
            .is_blocked()
    );
    assert!(gate.screen("truncate students").unwrap().verdict().is_blocked());
}

// =========================================================================
// Gate in front of the executor
// =========================================================================

#[tokio::test]
async fn test_generated_delete_is_blocked_until_confirmed() {
    let dir = tempfile::tempdir().unwrap();
    let session = setup(&dir, "DELETE FROM students").await;

    let proposal = session.ask("remove all the students").await.unwrap();
    assert_eq!(proposal.query.sql, "DELETE FROM students");
    assert_eq!(proposal.decision.verdict().label(), "UNSAFE-BLOCKED");

    let err = proposal.decision.approve().unwrap_err();
    assert!(matches!(err, ExplorerError::QueryBlocked { .. }));
    assert_eq!(student_count(&session).await, 3);

    let confirmed = proposal.decision.clone().confirm();
    assert_eq!(confirmed.verdict().label(), "UNSAFE-CONFIRMED");
    let approved = confirmed.approve().unwrap();
    assert!(approved.was_confirmed());

    let result = session.execute(&approved).await.unwrap();
    assert_eq!(result.rows_affected, Some(3));
    assert_eq!(student_count(&session).await, 0);
}

#[tokio::test]
async fn test_targeted_delete_runs_without_confirmation() {
    let dir = tempfile::tempdir().unwrap();
    let session = setup(&dir, "DELETE FROM students WHERE name = 'Ada'").await;

    let proposal = session.ask("remove Ada").await.unwrap();
    assert!(proposal.decision.verdict().is_safe());

    let approved = proposal.decision.approve().unwrap();
    assert!(!approved.was_confirmed());
    let result = session.execute(&approved).await.unwrap();
    assert_eq!(result.rows_affected, Some(1));
    assert_eq!(student_count(&session).await, 2);
}

#[tokio::test]
async fn test_delete_behind_cte_is_blocked_until_confirmed() {
    let dir = tempfile::tempdir().unwrap();
    let session = setup(&dir, "WITH old AS (SELECT id FROM students) DELETE FROM students").await;

    let proposal = session.ask("clear out the students").await.unwrap();
    let findings = proposal.decision.verdict().findings();
    assert_eq!(findings[0].operation, UnsafeOperation::DeleteWithoutWhere);
    assert!(proposal.decision.approve().is_err());
    assert_eq!(student_count(&session).await, 3);

    let update = session
        .screen("WITH x AS (SELECT 1) UPDATE students SET grade = 0")
        .unwrap();
    assert_eq!(
        update.verdict().findings()[0].operation,
        UnsafeOperation::UpdateWithoutWhere
    );

    let approved = proposal.decision.clone().confirm().approve().unwrap();
    let result = session.execute(&approved).await.unwrap();
    assert_eq!(result.rows_affected, Some(3));
    assert_eq!(student_count(&session).await, 0);
}

#[tokio::test]
async fn test_targeted_delete_behind_cte_runs() {
    let dir = tempfile::tempdir().unwrap();
    let session = setup(
        &dir,
        "WITH seniors AS (SELECT id FROM students WHERE grade > 10) DELETE FROM students WHERE id IN (SELECT id FROM seniors)",
    )
    .await;

    let proposal = session.ask("remove the seniors").await.unwrap();
    assert!(proposal.decision.verdict().is_safe());

    let result = session
        .execute(&proposal.decision.approve().unwrap())
        .await
        .unwrap();
    assert_eq!(result.rows_affected, Some(1));
    assert_eq!(student_count(&session).await, 2);
}

#[tokio::test]
async fn test_read_only_mode_blocks_inserts() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}?mode=rwc", dir.path().join("ro.db").display());
    let target = ConnectionTarget::parse(&url).unwrap();

    let mut settings = Settings::default();
    settings.index.dir = dir.path().join("index");
    settings.safety.read_only = true;
    let mut session = Session::new(
        Arc::new(settings),
        Arc::new(HashingEmbedder::new(256)),
        Arc::new(FixedModel("SELECT 1")),
    );
    session.connect(target).await.unwrap();

    let decision = session.screen("CREATE TABLE t (id INTEGER)").unwrap();
    assert_eq!(
        decision.verdict().findings()[0].operation,
        UnsafeOperation::Write
    );
    assert!(session.screen("SELECT 1").unwrap().verdict().is_safe());
}
