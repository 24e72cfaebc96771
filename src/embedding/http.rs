//! OpenAI-compatible embeddings endpoint.

use super::Embedder;
use crate::error::{ExplorerError, ExplorerResult};
use crate::settings::EmbeddingSettings;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const EMBEDDING_API_KEY_ENV: &str = "EXPLORER_EMBEDDING_API_KEY";
const DEFAULT_HTTP_MODEL: &str = "text-embedding-3-small";
const DEFAULT_HTTP_DIMENSIONS: usize = 1536;
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Client for `POST {base_url}/embeddings`.
///
/// Cheap to clone, the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpEmbedder {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    dimensions: usize,
    model_id: String,
}

impl HttpEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        dimensions: usize,
    ) -> ExplorerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ExplorerError::config(format!("Failed to build HTTP client: {}", e)))?;
        let model = model.into();
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model_id: format!("http:{}", model),
            model,
            api_key,
            dimensions,
        })
    }

    pub fn from_settings(settings: &EmbeddingSettings) -> ExplorerResult<Self> {
        let base_url = settings
            .base_url
            .clone()
            .ok_or_else(|| ExplorerError::config("embedding.base_url is required for the http provider"))?;
        let api_key = settings
            .api_key
            .clone()
            .or_else(|| std::env::var(EMBEDDING_API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty());
        Self::new(
            base_url,
            settings.model.as_deref().unwrap_or(DEFAULT_HTTP_MODEL),
            api_key,
            settings.dimensions.unwrap_or(DEFAULT_HTTP_DIMENSIONS),
        )
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, texts: &[String]) -> ExplorerResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.base_url);
        debug!(url = %url, inputs = texts.len(), "Requesting embeddings");

        let mut request = self.client.post(&url).json(&EmbeddingRequest {
            model: &self.model,
            input: texts,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| ExplorerError::embedding(format!("POST {} failed: {}", url, e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExplorerError::embedding(format!(
                "POST {} returned {}: {}",
                url,
                status,
                body.trim()
            )));
        }

        let mut parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| ExplorerError::embedding(format!("Invalid embeddings response: {}", e)))?;
        parsed.data.sort_by_key(|d| d.index);

        super::check_vectors(
            self,
            texts.len(),
            parsed.data.into_iter().map(|d| d.embedding).collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::EmbeddingProviderKind;

    #[test]
    fn test_from_settings_defaults() {
        let settings = EmbeddingSettings {
            provider: EmbeddingProviderKind::Http,
            base_url: Some("http://localhost:11434/v1/".to_string()),
            ..EmbeddingSettings::default()
        };
        let embedder = HttpEmbedder::from_settings(&settings).unwrap();
        assert_eq!(embedder.base_url, "http://localhost:11434/v1");
        assert_eq!(embedder.model_id(), "http:text-embedding-3-small");
        assert_eq!(embedder.dimensions(), DEFAULT_HTTP_DIMENSIONS);
    }

    #[test]
    fn test_from_settings_requires_base_url() {
        let settings = EmbeddingSettings {
            provider: EmbeddingProviderKind::Http,
            ..EmbeddingSettings::default()
        };
        assert!(HttpEmbedder::from_settings(&settings).is_err());
    }

    #[tokio::test]
    async fn test_empty_batch_skips_request() {
        let embedder = HttpEmbedder::new("http://127.0.0.1:9", "m", None, 8).unwrap();
        assert!(embedder.embed(&[]).await.unwrap().is_empty());
    }
}
