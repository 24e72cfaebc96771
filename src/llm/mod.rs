//! Language model access and SQL generation.
//!
//! The [`LanguageModel`] trait is the only seam to the completion service;
//! [`SqlGenerator`] builds the prompt from retrieved fragments and turns the
//! completion into a [`crate::models::GeneratedQuery`].

pub mod generator;
pub mod openai;
pub mod prompt;

pub use generator::SqlGenerator;
pub use openai::OpenAiChatModel;
pub use prompt::{NO_SCHEMA_PLACEHOLDER, build_prompt, clean_sql};

use crate::error::ExplorerResult;
use async_trait::async_trait;

/// Prompt text in, completion text out.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Recorded on every generated query.
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> ExplorerResult<String>;
}
