//! Process-wide knowledge base: loads the CSV and builds the vector index
//! exactly once, then hands out shared read-only handles.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::config::KnowledgeBaseConfig;
use crate::embeddings::EmbeddingModel;
use crate::error::{Error, Result};
use crate::processing::CsvLoader;
use crate::search::Retriever;
use crate::storage::VectorIndex;

pub struct KnowledgeBase {
    csv_path: PathBuf,
    loader: CsvLoader,
    embeddings: Arc<dyn EmbeddingModel>,
    index: OnceCell<Arc<VectorIndex>>,
}

impl KnowledgeBase {
    pub fn new(csv_path: impl Into<PathBuf>, embeddings: Arc<dyn EmbeddingModel>) -> Self {
        Self {
            csv_path: csv_path.into(),
            loader: CsvLoader::new(),
            embeddings,
            index: OnceCell::new(),
        }
    }

    /// Different knowledge-base variants are just different configs.
    /// `config` is expected to have passed `AppConfig::validate`.
    pub fn from_config(config: &KnowledgeBaseConfig, embeddings: Arc<dyn EmbeddingModel>) -> Self {
        Self {
            loader: CsvLoader::new().with_delimiter(config.delimiter as u8),
            ..Self::new(config.csv_path.clone(), embeddings)
        }
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    pub fn is_built(&self) -> bool {
        self.index.initialized()
    }

    /// Return the shared index, building it on first use. Concurrent callers
    /// wait on the same build; a failed build leaves the cell empty so the
    /// operator can retry.
    pub async fn index(&self) -> Result<Arc<VectorIndex>> {
        self.index
            .get_or_try_init(|| async {
                tracing::info!(source = %self.csv_path.display(), "Building knowledge base index");
                let documents = self.loader.load_file(&self.csv_path)?;
                let index = VectorIndex::build(documents, self.embeddings.clone()).await?;
                Ok::<_, Error>(Arc::new(index))
            })
            .await
            .cloned()
    }

    pub async fn retriever(&self) -> Result<Retriever> {
        Ok(Retriever::new(self.index().await?))
    }
}
