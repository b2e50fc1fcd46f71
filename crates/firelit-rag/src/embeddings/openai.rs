use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::EmbeddingModel;
use crate::error::{Error, Result};
use crate::llm::openai::{build_client, parse_json_response, status_error};
use crate::llm::ApiProvider;

#[derive(Debug, Clone)]
pub struct OpenAIEmbeddingsConfig {
    pub provider: ApiProvider,
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
    pub timeout: Duration,
}

/// Remote embeddings over the OpenAI `/embeddings` endpoint.
///
/// Every failure, including HTTP and parse errors, is reported as
/// `Error::EmbeddingService`.
pub struct OpenAIEmbeddings {
    config: OpenAIEmbeddingsConfig,
    api_key: String,
    client: Client,
}

impl OpenAIEmbeddings {
    pub fn new(config: OpenAIEmbeddingsConfig, api_key: String) -> Result<Self> {
        let client = build_client(config.timeout)?;
        Ok(Self { config, api_key, client })
    }

    async fn request(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let endpoint = self.config.provider.embeddings_endpoint();
        let request = json!({
            "model": self.config.model,
            "input": inputs,
        });

        let response = self
            .client
            .post(&endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::EmbeddingService(format!("Request to {} failed: {}", endpoint, e)))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::EmbeddingService(
                status_error(status, &headers, &body).to_string(),
            ));
        }

        let parsed: EmbeddingResponse = parse_json_response(response, &endpoint)
            .await
            .map_err(|e| Error::EmbeddingService(e.to_string()))?;

        order_embeddings(parsed, inputs.len(), self.config.dimension)
    }
}

#[async_trait]
impl EmbeddingModel for OpenAIEmbeddings {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.request(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::EmbeddingService("Empty embedding response".to_string()))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for (batch_index, batch) in texts.chunks(self.config.batch_size.max(1)).enumerate() {
            tracing::debug!(
                model = %self.config.model,
                batch = batch_index,
                size = batch.len(),
                "Embedding document batch"
            );
            vectors.extend(self.request(batch).await?);
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}

/// The API may return items out of order; `index` restores input order.
fn order_embeddings(
    response: EmbeddingResponse,
    expected: usize,
    dimension: usize,
) -> Result<Vec<Vec<f32>>> {
    if response.data.len() != expected {
        return Err(Error::EmbeddingService(format!(
            "Expected {} embeddings, got {}",
            expected,
            response.data.len()
        )));
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for item in response.data {
        if item.embedding.len() != dimension {
            return Err(Error::EmbeddingService(format!(
                "Embedding dimension mismatch: expected {}, got {}",
                dimension,
                item.embedding.len()
            )));
        }
        let slot = slots.get_mut(item.index).ok_or_else(|| {
            Error::EmbeddingService(format!("Embedding index {} out of range", item.index))
        })?;
        *slot = Some(item.embedding);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(i, v)| v.ok_or_else(|| Error::EmbeddingService(format!("Missing embedding {}", i))))
        .collect()
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}
