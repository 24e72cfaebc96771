//! The question-to-result session.
//!
//! A [`Session`] owns at most one database connection together with the
//! schema fragments extracted from it. Every step of the flow is a method:
//!
//! ```text
//! connect ─► extract ─► index
//! ask ─► retrieve ─► generate ─► screen ─► (confirm) ─► execute
//! ```
//!
//! Nothing is executed from [`Session::ask`]; callers turn the returned
//! [`GateDecision`] into an [`ApprovedQuery`] and hand it to
//! [`Session::execute`].

use crate::db::{DbPool, DemoSummary, Executor, SchemaExtractor, seed_demo};
use crate::embedding::Embedder;
use crate::error::{ExplorerError, ExplorerResult};
use crate::index::{IndexFiles, IndexOutcome, IndexStore, Retriever, SchemaIndexer};
use crate::llm::{LanguageModel, SqlGenerator};
use crate::models::{
    ConnectionTarget, DatabaseType, ExecutionResult, GeneratedQuery, SchemaFragment,
    ScoredFragment,
};
use crate::safety::{ApprovedQuery, GateDecision, SafetyGate};
use crate::settings::Settings;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of [`Session::connect`].
#[derive(Debug, Clone, Serialize)]
pub struct ConnectReport {
    pub database_id: String,
    pub db_type: DatabaseType,
    pub tables: usize,
    pub index: IndexOutcome,
    /// Set when the database has no tables
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Generated SQL awaiting a decision.
#[derive(Debug, Clone, Serialize)]
pub struct Proposal {
    pub query: GeneratedQuery,
    pub retrieved: Vec<ScoredFragment>,
    pub decision: GateDecision,
}

/// Outcome of [`Session::seed_demo`].
#[derive(Debug, Clone, Copy)]
pub struct DemoReport {
    pub summary: DemoSummary,
    pub index: IndexOutcome,
}

struct Connection {
    target: ConnectionTarget,
    pool: DbPool,
    fragments: Vec<SchemaFragment>,
}

pub struct Session {
    settings: Arc<Settings>,
    gate: SafetyGate,
    executor: Executor,
    indexer: SchemaIndexer,
    retriever: Retriever,
    generator: SqlGenerator,
    connection: Option<Connection>,
}

impl Session {
    pub fn new(
        settings: Arc<Settings>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        let store = IndexStore::new();
        let files = IndexFiles::new(settings.index.dir.clone());
        Self {
            gate: SafetyGate::from_settings(&settings.safety),
            executor: Executor::from_settings(&settings.executor),
            indexer: SchemaIndexer::new(embedder.clone(), files, store.clone()),
            retriever: Retriever::new(embedder, store),
            generator: SqlGenerator::new(model),
            connection: None,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn database_id(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.target.id.as_str())
    }

    pub fn db_type(&self) -> Option<DatabaseType> {
        self.connection.as_ref().map(|c| c.target.db_type)
    }

    /// Fragments of the connected database, in extraction order.
    pub fn fragments(&self) -> &[SchemaFragment] {
        self.connection
            .as_ref()
            .map(|c| c.fragments.as_slice())
            .unwrap_or_default()
    }

    /// Fragment for `table`, matched case-insensitively.
    pub fn fragment(&self, table: &str) -> Option<&SchemaFragment> {
        self.fragments()
            .iter()
            .find(|f| f.table_name.eq_ignore_ascii_case(table))
    }

    /// Connect to `target`, extract its schema and make its index active.
    ///
    /// Any previous connection is closed and its index dropped first, even
    /// when the new connection fails.
    pub async fn connect(&mut self, target: ConnectionTarget) -> ExplorerResult<ConnectReport> {
        self.disconnect().await;

        let pool = DbPool::connect(&target).await?;
        let (fragments, warning) =
            match SchemaExtractor::extract(&pool, &target.id, &self.settings.extractor).await {
                Ok(fragments) => (fragments, None),
                Err(e @ ExplorerError::EmptySchema { .. }) => {
                    warn!(database = %target.id, "Connected database has no tables");
                    (Vec::new(), Some(e.to_string()))
                }
                Err(e) => {
                    pool.close().await;
                    return Err(e);
                }
            };

        let index = match self.indexer.index(&target.id, &fragments, false).await {
            Ok(outcome) => outcome,
            Err(e) => {
                pool.close().await;
                return Err(e);
            }
        };

        let report = ConnectReport {
            database_id: target.id.clone(),
            db_type: target.db_type,
            tables: fragments.len(),
            index,
            warning,
        };
        info!(
            database = %report.database_id,
            tables = report.tables,
            index = %report.index,
            "Session connected"
        );

        self.connection = Some(Connection {
            target,
            pool,
            fragments,
        });
        Ok(report)
    }

    /// Close the connection and drop the active index. No-op when not connected.
    pub async fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.pool.close().await;
            info!(database = %connection.target.id, "Session disconnected");
        }
        self.indexer.store().clear().await;
    }

    /// Re-extract the schema and rebuild the index from scratch.
    pub async fn reindex(&mut self) -> ExplorerResult<IndexOutcome> {
        self.refresh_schema(true).await
    }

    async fn refresh_schema(&mut self, force: bool) -> ExplorerResult<IndexOutcome> {
        let connection = self.connection.as_mut().ok_or(ExplorerError::NotConnected)?;
        let fragments = match SchemaExtractor::extract(
            &connection.pool,
            &connection.target.id,
            &self.settings.extractor,
        )
        .await
        {
            Ok(fragments) => fragments,
            Err(ExplorerError::EmptySchema { .. }) => Vec::new(),
            Err(e) => return Err(e),
        };

        let outcome = self
            .indexer
            .index(&connection.target.id, &fragments, force)
            .await?;
        connection.fragments = fragments;
        Ok(outcome)
    }

    /// Turn a question into screened SQL. Nothing is executed.
    pub async fn ask(&self, question: &str) -> ExplorerResult<Proposal> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ExplorerError::invalid_input("Question cannot be empty"));
        }
        let connection = self.connection.as_ref().ok_or(ExplorerError::NotConnected)?;

        let retrieved = self
            .retriever
            .retrieve(&connection.target.id, question, self.settings.index.top_k)
            .await?;
        info!(
            database = %connection.target.id,
            tables = ?retrieved.iter().map(|h| h.fragment.table_name.as_str()).collect::<Vec<_>>(),
            "Retrieved schema context"
        );

        let query = self.generator.generate(question, &retrieved).await?;
        let decision = self.gate.screen(&query.sql)?;
        info!(
            query_id = %query.id,
            verdict = decision.verdict().label(),
            "Screened generated SQL"
        );

        Ok(Proposal {
            query,
            retrieved,
            decision,
        })
    }

    /// Screen SQL typed or edited by the user.
    pub fn screen(&self, sql: &str) -> ExplorerResult<GateDecision> {
        self.gate.screen(sql)
    }

    /// Run SQL that passed (or was confirmed past) the gate.
    pub async fn execute(&self, query: &ApprovedQuery) -> ExplorerResult<ExecutionResult> {
        let connection = self.connection.as_ref().ok_or(ExplorerError::NotConnected)?;
        if query.was_confirmed() {
            warn!(database = %connection.target.id, "Executing statement confirmed past the safety gate");
        }
        self.executor.execute(&connection.pool, query).await
    }

    /// Create and fill the demo tables, then refresh the schema index.
    pub async fn seed_demo(&mut self) -> ExplorerResult<DemoReport> {
        let connection = self.connection.as_ref().ok_or(ExplorerError::NotConnected)?;
        let summary = seed_demo(&connection.pool).await?;
        let index = self.refresh_schema(false).await?;
        Ok(DemoReport { summary, index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use async_trait::async_trait;

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

    fn session(dir: &std::path::Path, reply: &'static str) -> Session {
        let mut settings = Settings::default();
        settings.index.dir = dir.to_path_buf();
        Session::new(
            Arc::new(settings),
            Arc::new(HashingEmbedder::new(256)),
            Arc::new(FixedModel(reply)),
        )
    }

    fn memory_target() -> ConnectionTarget {
        ConnectionTarget::parse("sqlite::memory:").unwrap()
    }

    #[tokio::test]
    async fn test_requires_connection() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path(), "SELECT 1");
        assert!(!session.is_connected());
        assert!(matches!(
            session.ask("anything").await.unwrap_err(),
            ExplorerError::NotConnected
        ));
        assert!(matches!(
            session.reindex().await.unwrap_err(),
            ExplorerError::NotConnected
        ));
        let approved = session.screen("SELECT 1").unwrap().approve().unwrap();
        assert!(matches!(
            session.execute(&approved).await.unwrap_err(),
            ExplorerError::NotConnected
        ));
    }

    #[tokio::test]
    async fn test_blank_question_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path(), "SELECT 1");
        session.connect(memory_target()).await.unwrap();
        let err = session.ask("   ").await.unwrap_err();
        assert!(matches!(err, ExplorerError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_empty_database_connects_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path(), "SELECT 1 AS one");
        let report = session.connect(memory_target()).await.unwrap();

        assert_eq!(report.tables, 0);
        assert_eq!(report.index, IndexOutcome::Empty);
        assert!(report.warning.is_some());
        assert!(session.is_connected());
        assert_eq!(session.database_id(), Some("memory"));

        let proposal = session.ask("how many things are there?").await.unwrap();
        assert!(proposal.retrieved.is_empty());
        assert!(proposal.decision.verdict().is_safe());

        let result = session
            .execute(&proposal.decision.approve().unwrap())
            .await
            .unwrap();
        assert_eq!(result.row_count, 1);
    }

    #[tokio::test]
    async fn test_unsafe_proposal_is_not_approved() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path(), "DROP TABLE student");
        session.connect(memory_target()).await.unwrap();

        let proposal = session.ask("remove the students").await.unwrap();
        assert!(proposal.decision.verdict().is_blocked());
        assert!(matches!(
            proposal.decision.approve().unwrap_err(),
            ExplorerError::QueryBlocked { .. }
        ));
        assert!(proposal.decision.confirm().approve().unwrap().was_confirmed());
    }

    #[tokio::test]
    async fn test_seed_demo_reindexes() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path(), "SELECT COUNT(*) AS total FROM student");
        session.connect(memory_target()).await.unwrap();

        let report = session.seed_demo().await.unwrap();
        assert_eq!(report.summary.classes, 10);
        assert_eq!(report.index, IndexOutcome::Rebuilt { fragments: 3 });
        let tables: Vec<&str> = session
            .fragments()
            .iter()
            .map(|f| f.table_name.as_str())
            .collect();
        assert_eq!(tables, vec!["class", "student", "teacher"]);
        assert!(session.fragment("STUDENT").is_some());

        let proposal = session.ask("how many students are there").await.unwrap();
        assert_eq!(proposal.retrieved.len(), 3);
        let result = session
            .execute(&proposal.decision.approve().unwrap())
            .await
            .unwrap();
        assert_eq!(result.rows[0]["total"], serde_json::json!(1000));
    }

    #[tokio::test]
    async fn test_disconnect_clears_index() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path(), "SELECT 1");
        session.connect(memory_target()).await.unwrap();
        session.disconnect().await;
        assert!(!session.is_connected());
        assert!(session.fragments().is_empty());
        assert!(session.indexer.store().active_database().await.is_none());
    }
}
