//! Name normalization for ingestion and deduplication.
//!
//! Pipeline: Unicode NFC, optional case fold, whitespace collapse, optional
//! punctuation strip. The punctuation class is `[^\w\s]` with Unicode-aware
//! `\w`, so CJK characters survive the strip.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::graph::Entity;

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));
static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("punctuation pattern"));

/// Configurable name normalizer.
#[derive(Debug, Clone)]
pub struct EntityNormalizer {
    /// Fold to lowercase.
    pub lowercase: bool,
    /// Strip punctuation (CJK-safe).
    pub remove_punctuation: bool,
}

impl EntityNormalizer {
    pub fn new(lowercase: bool, remove_punctuation: bool) -> Self {
        Self {
            lowercase,
            remove_punctuation,
        }
    }

    /// Normalize a string for storage or comparison.
    pub fn normalize(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        let mut result: String = text.nfc().collect();
        if self.lowercase {
            result = result.to_lowercase();
        }
        let result = WHITESPACE.replace_all(&result, " ");
        let result = result.trim();
        if self.remove_punctuation {
            PUNCTUATION.replace_all(result, "").into_owned()
        } else {
            result.to_string()
        }
    }

    /// Deduplication key: `kind|normalized_name[|extra_field_values]`.
    ///
    /// Extra fields are property names; missing or empty values are skipped.
    pub fn normalized_key(&self, entity: &Entity, extra_fields: &[&str]) -> String {
        let mut parts = vec![
            entity.kind.as_str().to_string(),
            self.normalize(entity.name()),
        ];
        for field in extra_fields {
            if let Some(value) = entity.properties.get(*field) {
                let text = match value.as_str() {
                    Some(s) => s.to_string(),
                    None => value.to_string(),
                };
                if !text.is_empty() {
                    parts.push(self.normalize(&text));
                }
            }
        }
        parts.join("|")
    }
}

impl Default for EntityNormalizer {
    fn default() -> Self {
        Self::new(false, true)
    }
}

/// Case-folded full normalization, shared by the similarity scorer.
pub fn normalize_name(text: &str) -> String {
    EntityNormalizer::new(true, true).normalize(text)
}
