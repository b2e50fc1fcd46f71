//! Retrieval-augmented market analysis for prospective restaurant owners.
//!
//! A CSV of per-district store summaries is embedded once into an in-memory
//! index. Each chat session collects a location and an industry, runs one
//! grounded analysis against the index, then continues as free chat.

pub mod chat;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod indexing;
pub mod llm;
pub mod processing;
pub mod search;
pub mod storage;
pub mod templates;
pub mod types;

#[cfg(test)]
mod testing;

pub use chat::{ChatEngine, EngineSettings, Phase, Session};
pub use config::AppConfig;
pub use embeddings::{EmbeddingModel, OpenAIEmbeddings};
pub use error::{Error, Result};
pub use indexing::KnowledgeBase;
pub use llm::{
    ApiProvider, ChatMessage, ChatRole, CompletionProvider, GenerationConfig, OpenAIProvider,
    RetryPolicy, RetryingProvider,
};
pub use processing::CsvLoader;
pub use search::Retriever;
pub use storage::VectorIndex;
pub use templates::compose;
pub use types::{Document, SearchHit};
