//! Integration tests for schema indexing and retrieval.
//!
//! These tests verify that:
//! - A join question retrieves both joined tables ahead of unrelated ones
//! - Rebuilding from an unchanged schema yields identical entries
//! - A persisted index is reused by a later session and rebuilt on change
//! - Switching databases never leaks the previous database's fragments

use async_trait::async_trait;
use sql_explorer::db::{DbPool, SchemaExtractor};
use sql_explorer::embedding::{Embedder, HashingEmbedder};
use sql_explorer::error::ExplorerResult;
use sql_explorer::index::{IndexFiles, IndexOutcome, IndexStore, Retriever, SchemaIndexer};
use sql_explorer::llm::LanguageModel;
use sql_explorer::models::ConnectionTarget;
use sql_explorer::settings::{ExtractorSettings, Settings};
use sql_explorer::Session;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const SHOP_SCHEMA: &[&str] = &[
    "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER NOT NULL REFERENCES customers(id), amount REAL NOT NULL, created_at TEXT NOT NULL)",
    "CREATE TABLE suppliers (id INTEGER PRIMARY KEY, company TEXT NOT NULL, phone TEXT)",
    "CREATE TABLE inventory_items (id INTEGER PRIMARY KEY, sku TEXT NOT NULL, quantity INTEGER NOT NULL, warehouse TEXT)",
];

/// Records prompts and answers every question with the same SQL.
struct RecordingModel {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl RecordingModel {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for RecordingModel {
    fn model_name(&self) -> &str {
        "recording"
    }

    async fn complete(&self, prompt: &str) -> ExplorerResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

/// Create a SQLite file with the given statements and return its target.
async fn create_db(dir: &Path, name: &str, statements: &[&str]) -> ConnectionTarget {
    let url = format!("sqlite:{}?mode=rwc", dir.join(format!("{}.db", name)).display());
    let target = ConnectionTarget::parse(&url).unwrap();
    let pool = DbPool::connect(&target).await.unwrap();
    let DbPool::SQLite(sqlite) = &pool else {
        panic!("expected a SQLite pool");
    };
    for sql in statements {
        sqlx::query(sql).execute(sqlite).await.unwrap();
    }
    pool.close().await;
    target
}

fn settings(dir: &TempDir) -> Arc<Settings> {
    let mut settings = Settings::default();
    settings.index.dir = dir.path().join("index");
    Arc::new(settings)
}

fn session(dir: &TempDir, model: Arc<RecordingModel>) -> Session {
    Session::new(settings(dir), Arc::new(HashingEmbedder::new(1024)), model)
}

// =========================================================================
// Retrieval relevance
// =========================================================================

#[tokio::test]
async fn test_join_question_retrieves_both_tables_first() {
    let dir = tempfile::tempdir().unwrap();
    let target = create_db(dir.path(), "shop", SHOP_SCHEMA).await;
    let model = RecordingModel::new("SELECT 1");
    let mut session = session(&dir, model.clone());

    let report = session.connect(target).await.unwrap();
    assert_eq!(report.tables, 4);
    assert_eq!(report.index, IndexOutcome::Rebuilt { fragments: 4 });

    let proposal = session
        .ask("Show top 5 customers by purchase amount last month")
        .await
        .unwrap();

    let tables: Vec<&str> = proposal
        .retrieved
        .iter()
        .map(|hit| hit.fragment.table_name.as_str())
        .collect();
    assert_eq!(tables.len(), 3);
    let mut top_two = tables[..2].to_vec();
    top_two.sort();
    assert_eq!(top_two, vec!["customers", "orders"]);
    assert!(proposal.retrieved[1].score > proposal.retrieved[2].score);

    // Unrelated tables tie; extraction order decides
    assert_eq!(tables[2], "inventory_items");

    let prompt = model.last_prompt();
    assert!(prompt.contains("Table: orders"));
    assert!(prompt.contains("Table: customers"));
    assert!(!prompt.contains("Table: suppliers"));
    assert_eq!(
        proposal.query.retrieved_fragment_ids,
        proposal
            .retrieved
            .iter()
            .map(|h| h.fragment.id.clone())
            .collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_retriever_orders_and_bounds_results() {
    let dir = tempfile::tempdir().unwrap();
    let target = create_db(dir.path(), "shop", SHOP_SCHEMA).await;
    let pool = DbPool::connect(&target).await.unwrap();
    let fragments = SchemaExtractor::extract(&pool, "shop", &ExtractorSettings::default())
        .await
        .unwrap();

    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(1024));
    let store = IndexStore::new();
    let indexer = SchemaIndexer::new(embedder.clone(), IndexFiles::new(dir.path()), store.clone());
    indexer.index("shop", &fragments, false).await.unwrap();
    let retriever = Retriever::new(embedder, store);

    let hits = retriever
        .retrieve("shop", "amount of each order per customer", 10)
        .await
        .unwrap();
    assert_eq!(hits.len(), fragments.len());
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

    let hits = retriever.retrieve("shop", "orders", 2).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].fragment.table_name, "orders");
}

// =========================================================================
// Index lifecycle
// =========================================================================

#[tokio::test]
async fn test_rebuild_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let target = create_db(dir.path(), "shop", SHOP_SCHEMA).await;
    let pool = DbPool::connect(&target).await.unwrap();
    let fragments = SchemaExtractor::extract(&pool, "shop", &ExtractorSettings::default())
        .await
        .unwrap();

    let store = IndexStore::new();
    let indexer = SchemaIndexer::new(
        Arc::new(HashingEmbedder::new(1024)),
        IndexFiles::new(dir.path().join("index")),
        store.clone(),
    );

    indexer.index("shop", &fragments, true).await.unwrap();
    let first = store.read().await.as_ref().unwrap().entries().to_vec();
    indexer.index("shop", &fragments, true).await.unwrap();
    let second = store.read().await.as_ref().unwrap().entries().to_vec();

    assert_eq!(first.len(), 4);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_index_reused_by_next_session_and_rebuilt_on_change() {
    let dir = tempfile::tempdir().unwrap();
    let target = create_db(dir.path(), "shop", SHOP_SCHEMA).await;

    let mut first = session(&dir, RecordingModel::new("SELECT 1"));
    let report = first.connect(target.clone()).await.unwrap();
    assert_eq!(report.index, IndexOutcome::Rebuilt { fragments: 4 });
    first.disconnect().await;
    assert!(dir.path().join("index").join("shop.json").exists());

    let mut second = session(&dir, RecordingModel::new("SELECT 1"));
    let report = second.connect(target.clone()).await.unwrap();
    assert_eq!(report.index, IndexOutcome::Reused { fragments: 4 });

    let approved = second
        .screen("CREATE TABLE shipments (id INTEGER PRIMARY KEY, order_id INTEGER)")
        .unwrap()
        .approve()
        .unwrap();
    second.execute(&approved).await.unwrap();
    second.disconnect().await;

    let mut third = session(&dir, RecordingModel::new("SELECT 1"));
    let report = third.connect(target).await.unwrap();
    assert_eq!(report.index, IndexOutcome::Rebuilt { fragments: 5 });
}

#[tokio::test]
async fn test_reindex_forces_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let target = create_db(dir.path(), "shop", SHOP_SCHEMA).await;
    let mut session = session(&dir, RecordingModel::new("SELECT 1"));
    session.connect(target).await.unwrap();

    assert_eq!(
        session.reindex().await.unwrap(),
        IndexOutcome::Rebuilt { fragments: 4 }
    );
}

#[tokio::test]
async fn test_switching_database_drops_previous_fragments() {
    let dir = tempfile::tempdir().unwrap();
    let shop = create_db(dir.path(), "shop", SHOP_SCHEMA).await;
    let school = create_db(
        dir.path(),
        "school",
        &["CREATE TABLE student (id INTEGER PRIMARY KEY, name TEXT, marks INTEGER)"],
    )
    .await;

    let mut session = session(&dir, RecordingModel::new("SELECT 1"));
    session.connect(shop).await.unwrap();
    session.connect(school).await.unwrap();
    assert_eq!(session.database_id(), Some("school"));

    let proposal = session.ask("customers and their orders").await.unwrap();
    assert_eq!(proposal.retrieved.len(), 1);
    assert!(
        proposal
            .query
            .retrieved_fragment_ids
            .iter()
            .all(|id| id.starts_with("school:"))
    );
}
