//! Vector index records.

use crate::models::SchemaFragment;
use serde::{Deserialize, Serialize};

/// A schema fragment together with its embedding.
///
/// The embedding is derived data: it is recomputed whenever the fragment's
/// description changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedFragment {
    pub fragment: SchemaFragment,
    pub embedding: Vec<f32>,
    pub source_database: String,
    /// Position in extraction order, used to break score ties
    pub position: usize,
}

/// A retrieval hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredFragment {
    pub fragment: SchemaFragment,
    /// Cosine similarity in `[-1, 1]`
    pub score: f64,
}
