//! Builds (or reuses) the vector index for a database.

use super::store::{IndexFiles, IndexStore};
use super::vector::{VectorIndex, fingerprint};
use crate::embedding::{Embedder, check_vectors};
use crate::error::ExplorerResult;
use crate::models::SchemaFragment;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// What [`SchemaIndexer::index`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IndexOutcome {
    /// A persisted index matched the current schema and embedder
    Reused { fragments: usize },
    /// Vectors were recomputed and persisted
    Rebuilt { fragments: usize },
    /// No fragments to index
    Empty,
}

impl IndexOutcome {
    pub fn fragments(&self) -> usize {
        match self {
            Self::Reused { fragments } | Self::Rebuilt { fragments } => *fragments,
            Self::Empty => 0,
        }
    }
}

impl std::fmt::Display for IndexOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reused { fragments } => write!(f, "reused cached index ({} tables)", fragments),
            Self::Rebuilt { fragments } => write!(f, "built index ({} tables)", fragments),
            Self::Empty => write!(f, "empty index"),
        }
    }
}

pub struct SchemaIndexer {
    embedder: Arc<dyn Embedder>,
    files: IndexFiles,
    store: IndexStore,
}

impl SchemaIndexer {
    pub fn new(embedder: Arc<dyn Embedder>, files: IndexFiles, store: IndexStore) -> Self {
        Self {
            embedder,
            files,
            store,
        }
    }

    /// Make the index for `database_id` active.
    ///
    /// Reuses the persisted index when it was built from the same fragments
    /// with the same embedder, unless `force` is set. Otherwise every entry is
    /// recomputed and the persisted file is replaced as a whole.
    pub async fn index(
        &self,
        database_id: &str,
        fragments: &[SchemaFragment],
        force: bool,
    ) -> ExplorerResult<IndexOutcome> {
        let model_id = self.embedder.model_id().to_string();
        let dimensions = self.embedder.dimensions();
        let fingerprint = fingerprint(fragments);

        let mut active = self.store.write().await;
        // Nothing from a previous database stays visible, even if this fails
        *active = None;

        if fragments.is_empty() {
            *active = Some(VectorIndex::new(database_id, model_id, dimensions, fingerprint));
            info!(database = %database_id, "No tables to index");
            return Ok(IndexOutcome::Empty);
        }

        if !force {
            match self.files.load(database_id).await {
                Ok(Some(cached)) if cached.is_current(&model_id, dimensions, &fingerprint) => {
                    let count = cached.len();
                    *active = Some(cached);
                    info!(database = %database_id, fragments = count, "Reusing persisted index");
                    return Ok(IndexOutcome::Reused { fragments: count });
                }
                Ok(Some(_)) => {
                    info!(database = %database_id, "Persisted index is stale, rebuilding");
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(database = %database_id, error = %e, "Ignoring unreadable index file");
                }
            }
        }

        let texts: Vec<String> = fragments.iter().map(|f| f.description.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        let vectors = check_vectors(self.embedder.as_ref(), texts.len(), vectors)?;

        let mut index = VectorIndex::new(database_id, model_id, dimensions, fingerprint);
        for (fragment, vector) in fragments.iter().zip(vectors) {
            index.add(fragment.clone(), vector)?;
        }
        self.files.save(&index).await?;

        let count = index.len();
        *active = Some(index);
        info!(database = %database_id, fragments = count, "Rebuilt index");
        Ok(IndexOutcome::Rebuilt { fragments: count })
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }
}
