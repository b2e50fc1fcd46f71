use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use super::{with_continuation_notice, Phase, Session, LOCATION_ACK};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::indexing::KnowledgeBase;
use crate::llm::{ChatMessage, CompletionProvider, GenerationConfig};
use crate::templates::compose;

/// Per-flow decoding parameters and retrieval depth.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub k: usize,
    /// Used once per session for the grounded analysis.
    pub analysis: GenerationConfig,
    /// Used for every free-chat turn afterwards.
    pub chat: GenerationConfig,
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let completion = &config.completion;
        Self {
            k: config.retrieval.k,
            analysis: GenerationConfig {
                model: completion.analysis_model.clone(),
                temperature: completion.temperature,
                max_tokens: completion.analysis_max_tokens,
            },
            chat: GenerationConfig {
                model: completion.chat_model.clone(),
                temperature: completion.temperature,
                max_tokens: completion.chat_max_tokens,
            },
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Drives every session through location -> industry -> grounded analysis ->
/// free chat.
///
/// The knowledge base is shared read-only. Each session sits behind its own
/// async mutex, so turns for one session run strictly in order.
pub struct ChatEngine {
    knowledge: Arc<KnowledgeBase>,
    provider: Arc<dyn CompletionProvider>,
    settings: EngineSettings,
    sessions: DashMap<String, Arc<AsyncMutex<Session>>>,
}

impl ChatEngine {
    pub fn new(
        knowledge: Arc<KnowledgeBase>,
        provider: Arc<dyn CompletionProvider>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            knowledge,
            provider,
            settings,
            sessions: DashMap::new(),
        }
    }

    /// Create a fresh session and return its id.
    pub fn start_session(&self) -> String {
        let id = Uuid::new_v4().to_string();
        self.session_handle(&id);
        tracing::info!(session = %id, "Session started");
        id
    }

    /// Discard a session. Returns whether it existed.
    pub fn end_session(&self, session_id: &str) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        if removed {
            tracing::info!(session = %session_id, "Session ended");
        }
        removed
    }

    /// Drop sessions idle for longer than `max_idle`. Returns how many were removed.
    pub async fn evict_idle(&self, max_idle: chrono::Duration) -> usize {
        let cutoff = chrono::Utc::now() - max_idle;
        let handles: Vec<(String, Arc<AsyncMutex<Session>>)> = self
            .sessions
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        let mut evicted = 0;
        for (id, handle) in handles {
            // Map entry plus our clone; anything more is a caller about to lock it.
            if Arc::strong_count(&handle) > 2 {
                continue;
            }
            let Ok(session) = handle.try_lock() else {
                continue;
            };
            // Removed while the guard is held. The count is rechecked under the
            // shard lock, which every clone out of the map also takes.
            if session.last_active() < cutoff
                && self
                    .sessions
                    .remove_if(&id, |_, entry| {
                        Arc::ptr_eq(entry, &handle) && Arc::strong_count(entry) == 2
                    })
                    .is_some()
            {
                evicted += 1;
            }
            drop(session);
        }
        if evicted > 0 {
            tracing::info!(evicted, "Evicted idle sessions");
        }
        evicted
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub async fn get_history(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        let handle = self.existing_session(session_id)?;
        let session = handle.lock().await;
        Ok(session.history().to_vec())
    }

    pub async fn phase(&self, session_id: &str) -> Result<Phase> {
        let handle = self.existing_session(session_id)?;
        let session = handle.lock().await;
        Ok(session.phase().clone())
    }

    /// Process one user turn. Blank input is ignored and yields `Ok(None)`.
    ///
    /// On failure the user message stays in history and the phase is
    /// unchanged, so [`retry_last_turn`](Self::retry_last_turn) can replay it.
    pub async fn on_user_turn(&self, session_id: &str, text: &str) -> Result<Option<ChatMessage>> {
        if text.trim().is_empty() {
            tracing::debug!(session = %session_id, "Ignoring empty input");
            return Ok(None);
        }

        let handle = self.session_handle(session_id);
        let mut session = handle.lock().await;
        session.push(ChatMessage::user(text));
        self.advance(&mut session, text).await.map(Some)
    }

    /// Re-run the last turn if it failed. Returns `Ok(None)` when nothing is pending.
    pub async fn retry_last_turn(&self, session_id: &str) -> Result<Option<ChatMessage>> {
        let handle = self.existing_session(session_id)?;
        let mut session = handle.lock().await;
        let Some(pending) = session.pending_user_message().map(str::to_string) else {
            return Ok(None);
        };
        tracing::info!(session = %session_id, phase = session.phase().name(), "Retrying last turn");
        self.advance(&mut session, &pending).await.map(Some)
    }

    async fn advance(&self, session: &mut Session, input: &str) -> Result<ChatMessage> {
        let start_time = std::time::Instant::now();
        let phase_before = session.phase().name();

        let reply = match session.phase().clone() {
            Phase::AwaitingLocation => {
                session.set_phase(Phase::AwaitingIndustry {
                    location: input.to_string(),
                });
                ChatMessage::assistant(LOCATION_ACK)
            }
            Phase::AwaitingIndustry { location } => {
                let query = format!("{} {}", location, input);
                let reply = self.analyze(session, &query).await?;
                session.set_phase(Phase::FreeChat {
                    location,
                    industry: input.to_string(),
                });
                reply
            }
            Phase::FreeChat { .. } => {
                let reply = self.provider.complete(session.history(), &self.settings.chat).await;
                accept_truncated(reply)?
            }
        };

        session.push(reply.clone());
        tracing::info!(
            session = %session.id(),
            phase_before,
            phase_after = session.phase().name(),
            duration_ms = start_time.elapsed().as_millis() as u64,
            "Turn processed"
        );
        Ok(reply)
    }

    /// The one grounded turn: retrieve, compose, complete. History is not
    /// sent; the request is the system prompt plus the composed prompt.
    async fn analyze(&self, session: &Session, query: &str) -> Result<ChatMessage> {
        let retriever = self.knowledge.retriever().await?;
        // The index is already built here, so a failed query embedding is transient.
        let snippets = retriever
            .retrieve(query, self.settings.k)
            .await
            .map_err(|e| match e {
                Error::EmbeddingService(msg) => {
                    Error::Upstream(format!("query embedding failed: {}", msg))
                }
                other => other,
            })?;
        tracing::debug!(
            session = %session.id(),
            query = %query,
            snippets = snippets.len(),
            "Composing grounded prompt"
        );

        let messages = [
            session.system_message().clone(),
            ChatMessage::user(compose(query, &snippets)),
        ];
        accept_truncated(self.provider.complete(&messages, &self.settings.analysis).await)
    }

    fn session_handle(&self, session_id: &str) -> Arc<AsyncMutex<Session>> {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(Session::new(session_id))))
            .clone()
    }

    fn existing_session(&self, session_id: &str) -> Result<Arc<AsyncMutex<Session>>> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))
    }
}

/// A truncated reply still counts as a reply, with the continuation instruction appended.
fn accept_truncated(reply: Result<ChatMessage>) -> Result<ChatMessage> {
    match reply {
        Err(Error::ContentTruncated { partial }) => {
            Ok(ChatMessage::assistant(with_continuation_notice(&partial)))
        }
        other => other,
    }
}
