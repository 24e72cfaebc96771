//! Embedding providers.
//!
//! An [`Embedder`] turns text into fixed-length vectors. The same embedder
//! must be used to index schema fragments and to embed questions, so every
//! provider reports a stable [`Embedder::model_id`] that is stored with the
//! index and checked at retrieval time.

mod hashing;
mod http;
#[cfg(feature = "local-model")]
mod local;

pub use hashing::HashingEmbedder;
pub use http::HttpEmbedder;
#[cfg(feature = "local-model")]
pub use local::FastEmbedder;

use crate::error::{ExplorerError, ExplorerResult};
use crate::settings::{DEFAULT_HASHING_DIMENSIONS, EmbeddingProviderKind, EmbeddingSettings};
use async_trait::async_trait;
use std::sync::Arc;

/// Text to vector model.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier of the model, including anything that changes the vector space.
    fn model_id(&self) -> &str;

    /// Length of every vector this embedder returns.
    fn dimensions(&self) -> usize;

    /// Embed a batch of texts, one vector per input in input order.
    async fn embed(&self, texts: &[String]) -> ExplorerResult<Vec<Vec<f32>>>;

    async fn embed_one(&self, text: &str) -> ExplorerResult<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ExplorerError::embedding("Embedding provider returned no vector"))
    }
}

/// Check a batch returned by a provider: one vector per input, all of the
/// advertised length.
pub fn check_vectors(
    embedder: &dyn Embedder,
    expected_count: usize,
    vectors: Vec<Vec<f32>>,
) -> ExplorerResult<Vec<Vec<f32>>> {
    if vectors.len() != expected_count {
        return Err(ExplorerError::embedding(format!(
            "{} returned {} vectors for {} inputs",
            embedder.model_id(),
            vectors.len(),
            expected_count
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != embedder.dimensions()) {
        return Err(ExplorerError::embedding(format!(
            "{} returned a {}-dimensional vector, expected {}",
            embedder.model_id(),
            bad.len(),
            embedder.dimensions()
        )));
    }
    Ok(vectors)
}

/// Build the embedder selected in the settings.
pub fn build_embedder(settings: &EmbeddingSettings) -> ExplorerResult<Arc<dyn Embedder>> {
    match settings.provider {
        EmbeddingProviderKind::Hashing => Ok(Arc::new(HashingEmbedder::new(
            settings.dimensions.unwrap_or(DEFAULT_HASHING_DIMENSIONS),
        ))),
        EmbeddingProviderKind::Http => Ok(Arc::new(HttpEmbedder::from_settings(settings)?)),
        #[cfg(feature = "local-model")]
        EmbeddingProviderKind::Fastembed => Ok(Arc::new(FastEmbedder::from_settings(settings)?)),
        #[cfg(not(feature = "local-model"))]
        EmbeddingProviderKind::Fastembed => Err(ExplorerError::config(
            "embedding.provider = \"fastembed\" requires building with the `local-model` feature",
        )),
    }
}
