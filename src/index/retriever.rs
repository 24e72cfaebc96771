//! Top-K retrieval of schema fragments for a question.

use super::store::IndexStore;
use crate::embedding::Embedder;
use crate::error::{ExplorerError, ExplorerResult};
use crate::models::ScoredFragment;
use std::sync::Arc;
use tracing::debug;

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: IndexStore,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: IndexStore) -> Self {
        Self { embedder, store }
    }

    /// The `k` fragments most similar to `question`, best first.
    ///
    /// Returns an empty list when nothing is indexed. Fails when the active
    /// index belongs to another database or was built by another embedder.
    pub async fn retrieve(
        &self,
        database_id: &str,
        question: &str,
        k: usize,
    ) -> ExplorerResult<Vec<ScoredFragment>> {
        let active = self.store.read().await;
        let Some(index) = active.as_ref() else {
            return Ok(Vec::new());
        };

        if index.database_id != database_id {
            return Err(ExplorerError::index(format!(
                "Active index belongs to '{}', not '{}'",
                index.database_id, database_id
            )));
        }
        if index.model_id != self.embedder.model_id() {
            return Err(ExplorerError::index(format!(
                "Index was built with '{}' but questions are embedded with '{}'; re-index the database",
                index.model_id,
                self.embedder.model_id()
            )));
        }
        if index.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query = self.embedder.embed_one(question).await?;
        let hits = index.search(&query, k);
        debug!(
            database = %database_id,
            k,
            hits = ?hits.iter().map(|h| (h.fragment.table_name.as_str(), h.score)).collect::<Vec<_>>(),
            "Retrieved fragments"
        );
        Ok(hits)
    }
}
