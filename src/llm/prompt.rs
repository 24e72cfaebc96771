//! Fixed prompt template and completion cleanup.

use crate::models::ScoredFragment;
use regex::Regex;
use std::sync::LazyLock;

/// Schema block used when retrieval returned nothing.
pub const NO_SCHEMA_PLACEHOLDER: &str = "No schema available.";

const ROLE: &str = "You are an expert in converting English questions into SQL queries.";

const INSTRUCTIONS: &str = "\
- Convert the given English question into a valid SQL query.
- Use only the tables and columns listed in the schema.
- Give every selected column a proper alias.
- Prefer read-only queries; never modify data unless the question explicitly asks for it.
- Return a single statement.
- Do not add explanations, comments, preamble, or extra text.
- Do not include the word \"sql\" anywhere.
- Do not wrap the query in backticks.
- Only return the SQL query.";

static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:[A-Za-z]*[ \t]*\r?\n)?(.*?)```").expect("valid regex")
});

static LEADING_SQL_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^sql\s*[:\n]\s*").expect("valid regex"));

/// Render the prompt for one question.
pub fn build_prompt(question: &str, retrieved: &[ScoredFragment]) -> String {
    let schema = if retrieved.is_empty() {
        NO_SCHEMA_PLACEHOLDER.to_string()
    } else {
        retrieved
            .iter()
            .map(|hit| hit.fragment.description.trim_end())
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    format!(
        "{ROLE}\n\n### Database Schema:\n{schema}\n\n### Instructions:\n{INSTRUCTIONS}\n\n### User Question:\n{}\n",
        question.trim()
    )
}

/// Strip Markdown fences and a leading `sql` tag from a completion.
///
/// Returns an empty string when nothing but decoration is left.
pub fn clean_sql(completion: &str) -> String {
    let text = completion.trim();

    let text = match FENCE.captures(text) {
        Some(captures) => captures.get(1).map_or(text, |m| m.as_str()),
        None => text.trim_matches('`'),
    };

    let text = text.trim();
    let text = LEADING_SQL_TAG.replace(text, "");
    text.trim().to_string()
}
