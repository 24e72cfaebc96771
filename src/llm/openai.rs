//! OpenAI-compatible chat completions client (Groq by default).

use super::LanguageModel;
use crate::error::{ExplorerError, ExplorerResult};
use crate::settings::LlmSettings;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// `POST {base_url}/chat/completions` with bearer auth.
#[derive(Clone)]
pub struct OpenAiChatModel {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
}

impl std::fmt::Debug for OpenAiChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChatModel")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"****")
            .finish()
    }
}

impl OpenAiChatModel {
    pub fn new(settings: &LlmSettings, api_key: String) -> ExplorerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ExplorerError::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }

    /// Build from settings, resolving the API key from the file or environment.
    pub fn from_settings(settings: &LlmSettings) -> ExplorerResult<Self> {
        let api_key = settings.resolve_api_key()?;
        let model = Self::new(settings, api_key)?;
        info!(
            provider = %settings.provider,
            model = %model.model,
            "Initialized language model"
        );
        Ok(model)
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> ExplorerResult<String> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, prompt_chars = prompt.len(), "Requesting completion");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&ChatRequest {
                model: &self.model,
                messages: [ChatMessage {
                    role: "user",
                    content: prompt,
                }],
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExplorerError::generation(format!("Request to {} timed out", url))
                } else {
                    ExplorerError::generation(format!("Request to {} failed: {}", url, e))
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExplorerError::generation(provider_error(status, &body)));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ExplorerError::generation(format!("Invalid completion response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ExplorerError::generation("Model returned no choices"))
    }
}

/// The provider's own error message when the body carries one.
fn provider_error(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => format!("{}: {}", status, envelope.error.message),
        Err(_) if body.trim().is_empty() => status.to_string(),
        Err(_) => format!("{}: {}", status, body.trim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_prefers_message() {
        let body = r#"{"error":{"message":"Invalid API Key","type":"invalid_request_error"}}"#;
        let msg = provider_error(reqwest::StatusCode::UNAUTHORIZED, body);
        assert_eq!(msg, "401 Unauthorized: Invalid API Key");
    }

    #[test]
    fn test_provider_error_raw_body() {
        let msg = provider_error(reqwest::StatusCode::BAD_GATEWAY, "upstream down\n");
        assert_eq!(msg, "502 Bad Gateway: upstream down");
        assert_eq!(
            provider_error(reqwest::StatusCode::BAD_GATEWAY, ""),
            "502 Bad Gateway"
        );
    }

    #[test]
    fn test_debug_masks_api_key() {
        let model = OpenAiChatModel::new(&LlmSettings::default(), "gsk_secret".to_string()).unwrap();
        let debug = format!("{:?}", model);
        assert!(!debug.contains("gsk_secret"));
        assert_eq!(model.model_name(), crate::settings::DEFAULT_LLM_MODEL);
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_generation_error() {
        // Nothing listens on port 9 locally
        let settings = LlmSettings {
            base_url: "http://127.0.0.1:9/v1".to_string(),
            timeout_secs: 5,
            ..LlmSettings::default()
        };
        let model = OpenAiChatModel::new(&settings, "key".to_string()).unwrap();
        let err = model.complete("how many students?").await.unwrap_err();
        assert!(matches!(err, ExplorerError::Generation { .. }));
        assert!(err.to_string().contains("127.0.0.1:9"));
    }

    #[test]
    fn test_request_shape() {
        let body = serde_json::to_value(ChatRequest {
            model: "m",
            messages: [ChatMessage {
                role: "user",
                content: "hi",
            }],
            temperature: 0.0,
            max_tokens: 200,
        })
        .unwrap();
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["max_tokens"], 200);
    }
}
