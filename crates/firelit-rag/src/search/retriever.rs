use std::sync::Arc;

use crate::error::Result;
use crate::storage::VectorIndex;

pub const DEFAULT_K: usize = 3;

/// Read-only view over the shared index returning snippet text.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>) -> Self {
        Self { index }
    }

    /// Top-`k` document texts, most similar first. `k` is clamped to the index size.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>> {
        Ok(self
            .retrieve_scored(query, k)
            .await?
            .into_iter()
            .map(|(text, _)| text)
            .collect())
    }

    /// Like [`retrieve`](Self::retrieve) but keeps the squared L2 distance of each snippet.
    pub async fn retrieve_scored(&self, query: &str, k: usize) -> Result<Vec<(String, f32)>> {
        let hits = self.index.search(query, k.min(self.index.len())).await?;
        tracing::debug!(query = %query, k, hits = hits.len(), "Retrieved snippets");
        Ok(hits
            .into_iter()
            .map(|hit| (hit.document.text, hit.distance))
            .collect())
    }

    pub fn index_size(&self) -> usize {
        self.index.len()
    }
}
