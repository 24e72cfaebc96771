//! Offline feature-hashing embedder.
//!
//! Deterministic for a given dimension count and needs no model download or
//! network access, which makes it the default provider. Lexical overlap
//! between a question and a table description (table names, column names,
//! sample values) drives similarity.

use super::Embedder;
use crate::error::ExplorerResult;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Words that carry no schema signal in questions.
const STOPWORDS: &[&str] = &[
    "a", "all", "an", "and", "are", "as", "at", "be", "by", "each", "for", "from", "give", "how",
    "in", "is", "it", "list", "many", "me", "of", "on", "or", "show", "that", "the", "their",
    "to", "what", "which", "who", "with",
];

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
    model_id: String,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            model_id: format!("hashing-v1-{}", dimensions),
        }
    }

    /// Embed one text synchronously.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut counts: HashMap<String, u32> = HashMap::new();
        for token in tokenize(text) {
            *counts.entry(token).or_default() += 1;
        }

        let mut vector = vec![0.0f32; self.dimensions];
        for (token, count) in counts {
            let (bucket, sign) = self.bucket(&token);
            // Sublinear term frequency
            let weight = 1.0 + (count as f32).ln();
            vector[bucket] += sign * weight;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let digest = Sha256::digest(token.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(head) % self.dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (bucket, sign)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, texts: &[String]) -> ExplorerResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// Lower-cased alphabetic tokens. Identifiers split on `_` and digits, plural
/// suffixes are folded so `orders` and `order_id` share a token.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphabetic())
        .filter(|t| !t.is_empty())
        .map(|t| fold_plural(&t.to_lowercase()))
        .filter(|t| t.len() > 1 && !STOPWORDS.contains(&t.as_str()))
}

fn fold_plural(word: &str) -> String {
    if word.len() > 4 && word.ends_with("ies") {
        return format!("{}y", &word[..word.len() - 3]);
    }
    if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}
