//! SQL Generator: one prompt, one completion, one candidate statement.

use super::LanguageModel;
use super::prompt::{build_prompt, clean_sql};
use crate::error::{ExplorerError, ExplorerResult};
use crate::models::{GeneratedQuery, ScoredFragment};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub struct SqlGenerator {
    model: Arc<dyn LanguageModel>,
}

impl SqlGenerator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Ask the model for SQL answering `question`.
    ///
    /// The SQL is not checked against the schema; that is left to the
    /// Safety Gate and the database itself.
    pub async fn generate(
        &self,
        question: &str,
        retrieved: &[ScoredFragment],
    ) -> ExplorerResult<GeneratedQuery> {
        let prompt = build_prompt(question, retrieved);
        let started = Instant::now();

        let completion = self.model.complete(&prompt).await?;
        let sql = clean_sql(&completion);
        if sql.is_empty() {
            warn!(model = %self.model.model_name(), "Model returned an empty completion");
            return Err(ExplorerError::generation("Model returned an empty response"));
        }

        info!(
            model = %self.model.model_name(),
            context_tables = retrieved.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Generated SQL"
        );

        Ok(GeneratedQuery::new(
            question.trim(),
            sql,
            retrieved.iter().map(|hit| hit.fragment.id.clone()).collect(),
            self.model.model_name(),
        ))
    }
}
