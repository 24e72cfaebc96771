//! In-memory vector index over schema fragments.

use crate::error::{ExplorerError, ExplorerResult};
use crate::models::{IndexedFragment, SchemaFragment, ScoredFragment};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Embedded fragments of one database, plus what is needed to tell whether
/// the index is still valid for that database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    pub database_id: String,
    /// Embedder that produced the vectors
    pub model_id: String,
    pub dimensions: usize,
    /// See [`fingerprint`]
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    entries: Vec<IndexedFragment>,
}

impl VectorIndex {
    pub fn new(
        database_id: impl Into<String>,
        model_id: impl Into<String>,
        dimensions: usize,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            database_id: database_id.into(),
            model_id: model_id.into(),
            dimensions,
            fingerprint: fingerprint.into(),
            created_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    /// Append a fragment. Position follows insertion order.
    pub fn add(&mut self, fragment: SchemaFragment, embedding: Vec<f32>) -> ExplorerResult<()> {
        if embedding.len() != self.dimensions {
            return Err(ExplorerError::index(format!(
                "Vector for '{}' has {} dimensions, index expects {}",
                fragment.id,
                embedding.len(),
                self.dimensions
            )));
        }
        let position = self.entries.len();
        self.entries.push(IndexedFragment {
            fragment,
            embedding,
            source_database: self.database_id.clone(),
            position,
        });
        Ok(())
    }

    /// The `k` most similar fragments, best first. Ties keep extraction order.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<ScoredFragment> {
        let mut hits: Vec<(usize, f64, &IndexedFragment)> = self
            .entries
            .iter()
            .map(|entry| {
                let score = cosine_similarity(query, &entry.embedding).unwrap_or(0.0);
                (entry.position, score, entry)
            })
            .collect();

        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        hits.truncate(k);

        hits.into_iter()
            .map(|(_, score, entry)| ScoredFragment {
                fragment: entry.fragment.clone(),
                score,
            })
            .collect()
    }

    /// Whether this index was built from the same schema with the same embedder.
    pub fn is_current(&self, model_id: &str, dimensions: usize, fingerprint: &str) -> bool {
        self.model_id == model_id && self.dimensions == dimensions && self.fingerprint == fingerprint
    }

    pub fn entries(&self) -> &[IndexedFragment] {
        &self.entries
    }

    pub fn fragment_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.fragment.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// SHA-256 over the fragment descriptions in extraction order.
pub fn fingerprint(fragments: &[SchemaFragment]) -> String {
    let mut hasher = Sha256::new();
    for fragment in fragments {
        hasher.update(fragment.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(fragment.description.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// Cosine similarity, `None` for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let x64 = f64::from(x);
        let y64 = f64::from(y);
        dot += x64 * y64;
        norm_a += x64 * x64;
        norm_b += y64 * y64;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON {
        return None;
    }
    Some(dot / denom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ColumnInfo;

    fn fragment(table: &str) -> SchemaFragment {
        SchemaFragment::new(
            "db",
            table,
            vec![ColumnInfo::new("id", "INTEGER", false)],
            Vec::new(),
            None,
        )
    }

    fn index_with(vectors: &[(&str, [f32; 2])]) -> VectorIndex {
        let mut index = VectorIndex::new("db", "test", 2, "fp");
        for (table, v) in vectors {
            index.add(fragment(table), v.to_vec()).unwrap();
        }
        index
    }

    #[test]
    fn test_cosine_similarity() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), Some(1.0));
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), Some(0.0));
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), None);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), None);
    }

    #[test]
    fn test_search_orders_by_score_then_position() {
        let index = index_with(&[
            ("a", [0.0, 1.0]),
            ("b", [1.0, 0.0]),
            ("c", [1.0, 0.0]),
            ("d", [0.7, 0.7]),
        ]);
        let hits = index.search(&[1.0, 0.0], 3);
        let ids: Vec<&str> = hits.iter().map(|h| h.fragment.table_name.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "d"]);
        assert!(hits[0].score >= hits[1].score && hits[1].score >= hits[2].score);
    }

    #[test]
    fn test_search_k_larger_than_index() {
        let index = index_with(&[("a", [0.0, 1.0]), ("b", [1.0, 0.0])]);
        assert_eq!(index.search(&[1.0, 1.0], 10).len(), 2);
        assert!(VectorIndex::new("db", "m", 2, "fp").search(&[1.0, 0.0], 3).is_empty());
    }

    #[test]
    fn test_add_rejects_wrong_dimensions() {
        let mut index = VectorIndex::new("db", "m", 3, "fp");
        let err = index.add(fragment("a"), vec![1.0]).unwrap_err();
        assert!(matches!(err, ExplorerError::Index { .. }));
    }

    #[test]
    fn test_fingerprint_tracks_descriptions() {
        let a = vec![fragment("orders"), fragment("customers")];
        let b = vec![fragment("orders"), fragment("customers")];
        let c = vec![fragment("customers"), fragment("orders")];
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&c));
        assert_eq!(fingerprint(&a).len(), 64);
    }

    #[test]
    fn test_is_current() {
        let index = VectorIndex::new("db", "m", 2, "fp");
        assert!(index.is_current("m", 2, "fp"));
        assert!(!index.is_current("other", 2, "fp"));
        assert!(!index.is_current("m", 3, "fp"));
        assert!(!index.is_current("m", 2, "changed"));
    }
}
