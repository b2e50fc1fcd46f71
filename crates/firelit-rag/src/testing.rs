//! In-process fakes for the embedding and completion seams.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::embeddings::EmbeddingModel;
use crate::error::{Error, Result};
use crate::llm::{ChatMessage, CompletionProvider, GenerationConfig};

/// Deterministic character-bigram hashing embedder. Texts sharing more
/// bigrams land closer together, which is enough to exercise ranking.
pub struct HashingEmbeddings {
    dimension: usize,
    documents: AtomicUsize,
    queries: AtomicUsize,
    fail: bool,
    fail_queries: bool,
}

impl HashingEmbeddings {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            documents: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
            fail: false,
            fail_queries: false,
        }
    }

    pub fn failing(dimension: usize) -> Self {
        Self { fail: true, ..Self::new(dimension) }
    }

    /// Builds an index fine but cannot embed queries.
    pub fn failing_queries(dimension: usize) -> Self {
        Self {
            fail_queries: true,
            ..Self::new(dimension)
        }
    }

    pub fn documents_embedded(&self) -> usize {
        self.documents.load(Ordering::SeqCst)
    }

    pub fn queries_embedded(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let chars: Vec<char> = text.chars().collect();
        for pair in chars.windows(2) {
            let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
            for c in pair {
                hash ^= *c as u64;
                hash = hash.wrapping_mul(0x0100_0000_01b3);
            }
            vector[(hash % self.dimension as u64) as usize] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingModel for HashingEmbeddings {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if self.fail || self.fail_queries {
            return Err(Error::EmbeddingService("backend unreachable".into()));
        }
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.embed(text))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail {
            return Err(Error::EmbeddingService("backend unreachable".into()));
        }
        // Yield so concurrent builders can interleave.
        tokio::task::yield_now().await;
        self.documents.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Completion provider that replays scripted results and records every request.
/// Once the script runs out it answers `reply N`.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ChatMessage>>>,
    requests: Mutex<Vec<(Vec<ChatMessage>, GenerationConfig)>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<ChatMessage>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<(Vec<ChatMessage>, GenerationConfig)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
    ) -> Result<ChatMessage> {
        let call = {
            let mut requests = self.requests.lock();
            requests.push((messages.to_vec(), config.clone()));
            requests.len()
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(ChatMessage::assistant(format!("reply {}", call))))
    }

    fn name(&self) -> String {
        "scripted".to_string()
    }
}
