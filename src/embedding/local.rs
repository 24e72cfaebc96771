//! Local sentence-embedding model (AllMiniLM-L6-v2) via fastembed.

use super::Embedder;
use crate::error::{ExplorerError, ExplorerResult};
use crate::settings::EmbeddingSettings;
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const ALL_MINILM_L6_V2_DIMENSIONS: usize = 384;
const DEFAULT_CACHE_DIR: &str = ".explorer/models";

pub struct FastEmbedder {
    model: Arc<TextEmbedding>,
}

impl FastEmbedder {
    pub fn from_settings(settings: &EmbeddingSettings) -> ExplorerResult<Self> {
        let cache_dir = settings
            .cache_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));
        std::fs::create_dir_all(&cache_dir).map_err(|e| ExplorerError::file_io(&cache_dir, e))?;

        info!(cache_dir = %cache_dir.display(), "Initializing embedding model (AllMiniLM-L6-V2)");
        let options = InitOptions::new(EmbeddingModel::AllMiniLML6V2)
            .with_cache_dir(cache_dir)
            .with_show_download_progress(false);

        let model = TextEmbedding::try_new(options).map_err(|e| {
            ExplorerError::embedding(format!("Failed to initialize embedding model: {}", e))
        })?;
        Ok(Self {
            model: Arc::new(model),
        })
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    fn model_id(&self) -> &str {
        "fastembed:all-MiniLM-L6-v2"
    }

    fn dimensions(&self) -> usize {
        ALL_MINILM_L6_V2_DIMENSIONS
    }

    async fn embed(&self, texts: &[String]) -> ExplorerResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // ONNX inference is CPU-bound
        let model = Arc::clone(&self.model);
        let inputs = texts.to_vec();
        let vectors = tokio::task::spawn_blocking(move || model.embed(inputs, None))
            .await
            .map_err(|e| ExplorerError::internal(format!("Embedding task failed: {}", e)))?
            .map_err(|e| ExplorerError::embedding(e.to_string()))?;

        super::check_vectors(self, texts.len(), vectors)
    }
}
