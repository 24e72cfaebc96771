//! Index persistence and the process-wide active index.

use super::vector::VectorIndex;
use crate::error::{ExplorerError, ExplorerResult};
use humansize::{DECIMAL, format_size};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// JSON files under a directory, one per database id.
#[derive(Debug, Clone)]
pub struct IndexFiles {
    dir: PathBuf,
}

impl IndexFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File backing the index of `database_id`.
    pub fn path_for(&self, database_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_id(database_id)))
    }

    /// Load a persisted index. `None` when no file exists.
    pub async fn load(&self, database_id: &str) -> ExplorerResult<Option<VectorIndex>> {
        let path = self.path_for(database_id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No persisted index");
                return Ok(None);
            }
            Err(e) => return Err(ExplorerError::file_io(&path, e)),
        };

        let index: VectorIndex = serde_json::from_slice(&raw).map_err(|e| {
            ExplorerError::index(format!("Corrupt index file {}: {}", path.display(), e))
        })?;
        if index.database_id != database_id {
            return Err(ExplorerError::index(format!(
                "Index file {} belongs to database '{}'",
                path.display(),
                index.database_id
            )));
        }
        Ok(Some(index))
    }

    /// Write the index, replacing any previous file for the same database.
    ///
    /// The file is written to a temporary sibling and renamed into place, so
    /// readers see either the old or the new index, never a partial one.
    pub async fn save(&self, index: &VectorIndex) -> ExplorerResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ExplorerError::file_io(&self.dir, e))?;

        let path = self.path_for(&index.database_id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(index)
            .map_err(|e| ExplorerError::internal(format!("Failed to serialize index: {}", e)))?;

        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| ExplorerError::file_io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| ExplorerError::file_io(&path, e))?;

        info!(
            path = %path.display(),
            fragments = index.len(),
            size = %format_size(bytes.len() as u64, DECIMAL),
            "Persisted index"
        );
        Ok(path)
    }
}

/// Keep ids filesystem-safe: anything but `[A-Za-z0-9._-]` becomes `_`.
fn sanitize_id(database_id: &str) -> String {
    let cleaned: String = database_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned.to_string()
    }
}

/// The active index, shared between indexer and retriever.
///
/// Rebuilds hold the write guard for the whole rebuild-then-swap, so a
/// retrieval never observes a half-built index.
#[derive(Debug, Clone, Default)]
pub struct IndexStore {
    active: Arc<RwLock<Option<VectorIndex>>>,
}

impl IndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, Option<VectorIndex>> {
        self.active.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, Option<VectorIndex>> {
        self.active.write().await
    }

    /// Drop the active index.
    pub async fn clear(&self) {
        let mut guard = self.active.write().await;
        if let Some(previous) = guard.take() {
            debug!(database = %previous.database_id, "Cleared active index");
        }
    }

    /// Database id of the active index, if any.
    pub async fn active_database(&self) -> Option<String> {
        self.active.read().await.as_ref().map(|i| i.database_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnInfo, SchemaFragment};

    fn sample_index(database_id: &str) -> VectorIndex {
        let mut index = VectorIndex::new(database_id, "hashing-v1-2", 2, "fp");
        index
            .add(
                SchemaFragment::new(
                    database_id,
                    "orders",
                    vec![ColumnInfo::new("id", "INTEGER", false)],
                    Vec::new(),
                    None,
                ),
                vec![1.0, 0.0],
            )
            .unwrap();
        index
    }

    #[test]
    fn test_sanitize_id() {
        assert_eq!(sanitize_id("shop"), "shop");
        assert_eq!(sanitize_id("../etc/passwd"), "_etc_passwd");
        assert_eq!(sanitize_id("a b:c"), "a_b_c");
        assert_eq!(sanitize_id(""), "default");
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let files = IndexFiles::new(dir.path().join("index"));

        assert!(files.load("shop").await.unwrap().is_none());

        let path = files.save(&sample_index("shop")).await.unwrap();
        assert!(path.ends_with("shop.json"));
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = files.load("shop").await.unwrap().unwrap();
        assert_eq!(loaded.fragment_ids(), vec!["shop:orders"]);
        assert_eq!(loaded.model_id, "hashing-v1-2");
    }

    #[tokio::test]
    async fn test_save_replaces_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let files = IndexFiles::new(dir.path());

        files.save(&sample_index("shop")).await.unwrap();
        let empty = VectorIndex::new("shop", "hashing-v1-2", 2, "other");
        files.save(&empty).await.unwrap();

        let loaded = files.load("shop").await.unwrap().unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.fingerprint, "other");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_index_error() {
        let dir = tempfile::tempdir().unwrap();
        let files = IndexFiles::new(dir.path());
        std::fs::write(files.path_for("shop"), b"{not json").unwrap();
        let err = files.load("shop").await.unwrap_err();
        assert!(matches!(err, ExplorerError::Index { .. }));
    }

    #[tokio::test]
    async fn test_store_clear() {
        let store = IndexStore::new();
        *store.write().await = Some(sample_index("shop"));
        assert_eq!(store.active_database().await.as_deref(), Some("shop"));
        store.clear().await;
        assert!(store.active_database().await.is_none());
    }
}
