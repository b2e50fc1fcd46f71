use ndarray::{Array2, ArrayView1, Axis};
use std::sync::Arc;

use crate::embeddings::EmbeddingModel;
use crate::error::{Error, Result};
use crate::types::{Document, SearchHit};

/// Exact nearest-neighbour index over document embeddings.
///
/// Vectors live in one row-major matrix aligned with `documents`; a search is
/// a single broadcast pass computing squared L2 distance to every row.
/// Immutable once built.
pub struct VectorIndex {
    documents: Vec<Document>,
    vectors: Array2<f32>,
    embeddings: Arc<dyn EmbeddingModel>,
}

impl VectorIndex {
    /// Embed every document and build the index. An empty input builds an
    /// empty index without contacting the embedding service.
    pub async fn build(documents: Vec<Document>, embeddings: Arc<dyn EmbeddingModel>) -> Result<Self> {
        let dimension = embeddings.dimension();
        if documents.is_empty() {
            tracing::warn!("Building an empty vector index");
            return Ok(Self {
                documents,
                vectors: Array2::zeros((0, dimension)),
                embeddings,
            });
        }

        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let started = std::time::Instant::now();
        let vectors = embeddings.embed_documents(&texts).await?;

        if vectors.len() != documents.len() {
            return Err(Error::EmbeddingService(format!(
                "Embedding backend returned {} vectors for {} documents",
                vectors.len(),
                documents.len()
            )));
        }

        let mut flat = Vec::with_capacity(documents.len() * dimension);
        for (row, vector) in vectors.into_iter().enumerate() {
            if vector.len() != dimension {
                return Err(Error::EmbeddingService(format!(
                    "Vector for row {} has dimension {}, expected {}",
                    row,
                    vector.len(),
                    dimension
                )));
            }
            flat.extend(vector);
        }

        let vectors = Array2::from_shape_vec((documents.len(), dimension), flat)
            .map_err(|e| Error::EmbeddingService(format!("Failed to shape vectors: {}", e)))?;

        tracing::info!(
            documents = documents.len(),
            dimension,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Vector index built"
        );

        Ok(Self {
            documents,
            vectors,
            embeddings,
        })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.vectors.ncols()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Embed `query` and return at most `k` hits, closest first.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let query_vector = self.embeddings.embed_query(query).await?;
        self.search_by_vector(&query_vector, k)
    }

    /// Rank by squared L2 distance. Ties keep document order.
    pub fn search_by_vector(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension() {
            return Err(Error::EmbeddingService(format!(
                "Query vector has dimension {}, index expects {}",
                query.len(),
                self.dimension()
            )));
        }

        let q = ArrayView1::from(query);
        let diffs = &self.vectors - &q;
        let distances = diffs.mapv(|x| x * x).sum_axis(Axis(1));

        let mut ranked: Vec<(usize, f32)> = distances.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        ranked.truncate(k.min(self.len()));

        Ok(ranked
            .into_iter()
            .map(|(row, distance)| SearchHit {
                document: self.documents[row].clone(),
                distance,
            })
            .collect())
    }
}
