use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One knowledge-base record. Built from a single CSV row and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Flattened `field: value` rendering of the row, used for embedding and prompts.
    pub text: String,
    /// Column name to cell value.
    pub metadata: BTreeMap<String, String>,
    /// Path of the file the row came from.
    pub source: String,
    /// Zero-based data row index (header excluded).
    pub row: usize,
}

impl Document {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.metadata.get(name).map(String::as_str)
    }
}

/// A document returned by a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub document: Document,
    /// Squared L2 distance to the query. Lower is more similar.
    pub distance: f32,
}
