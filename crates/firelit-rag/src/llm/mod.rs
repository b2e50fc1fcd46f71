//! Completion client - chat completions against OpenAI-compatible APIs
//! with bounded retry for throttling.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod openai;
pub mod retry;

pub use openai::OpenAIProvider;
pub use retry::{RetryPolicy, RetryingProvider};

/// External API providers speaking the OpenAI chat-completions wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ApiProvider {
    OpenAI,
    OpenRouter,
    Together,
    Ollama,
    Custom { endpoint: String },
}

impl ApiProvider {
    /// Base URL without the trailing resource path.
    pub fn base_url(&self) -> String {
        match self {
            ApiProvider::OpenAI => "https://api.openai.com/v1".to_string(),
            ApiProvider::OpenRouter => "https://openrouter.ai/api/v1".to_string(),
            ApiProvider::Together => "https://api.together.xyz/v1".to_string(),
            ApiProvider::Ollama => "http://localhost:11434/v1".to_string(),
            ApiProvider::Custom { endpoint } => endpoint.trim_end_matches('/').to_string(),
        }
    }

    pub fn chat_endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url())
    }

    pub fn embeddings_endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url())
    }

    pub fn name(&self) -> &'static str {
        match self {
            ApiProvider::OpenAI => "OpenAI",
            ApiProvider::OpenRouter => "OpenRouter",
            ApiProvider::Together => "Together",
            ApiProvider::Ollama => "Ollama",
            ApiProvider::Custom { .. } => "Custom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One entry of the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Decoding parameters for a single completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// Core trait for completion providers.
///
/// Implementations return the assistant message on success and map failures
/// onto the crate error taxonomy: throttling is `RateLimited`, a reply cut at
/// `max_tokens` is `ContentTruncated`, everything else is `Upstream`.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
    ) -> Result<ChatMessage>;

    fn name(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints() {
        assert_eq!(
            ApiProvider::OpenAI.chat_endpoint(),
            "https://api.openai.com/v1/chat/completions"
        );
        let custom = ApiProvider::Custom { endpoint: "http://proxy.local/v1/".into() };
        assert_eq!(custom.embeddings_endpoint(), "http://proxy.local/v1/embeddings");
    }

    #[test]
    fn test_roles_serialize_lowercase() {
        let json = serde_json::to_value(ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "hi");
    }
}
