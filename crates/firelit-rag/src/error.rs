use std::time::Duration;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy for the RAG pipeline.
///
/// Start-up failures (`DataSource`, `EmbeddingService`, `Configuration`) are
/// fatal. Completion failures are surfaced to the user and never corrupt the
/// session: the user message that triggered them stays in history.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Knowledge-base file missing, unreadable, or malformed.
    #[error("data source error: {0}")]
    DataSource(String),

    /// Embedding backend unreachable or returned unusable vectors.
    #[error("embedding service error: {0}")]
    EmbeddingService(String),

    /// Completion endpoint failed (network, auth, server, timeout, bad body).
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Completion endpoint throttled the request.
    #[error("rate limited by upstream (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// The reply hit the output-token ceiling. `partial` holds what was generated.
    #[error("response truncated at the output token limit")]
    ContentTruncated { partial: String },

    /// Missing credential or invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),
}

impl Error {
    /// Only throttling is worth retrying automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RateLimited { .. })
    }

    /// Text shown to the end user when a turn fails.
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::Upstream(_) | Error::RateLimited { .. } => {
                "죄송합니다. 응답을 생성하지 못했습니다. 잠시 후 다시 시도해 주세요."
            }
            Error::ContentTruncated { .. } => crate::chat::CONTINUATION_NOTICE,
            Error::SessionNotFound(_) => "대화 세션이 만료되었습니다. 새 대화를 시작해 주세요.",
            Error::DataSource(_) | Error::EmbeddingService(_) | Error::Configuration(_) => {
                "서비스를 준비하는 중 문제가 발생했습니다. 관리자에게 문의해 주세요."
            }
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Upstream(format!("request timed out: {}", e))
        } else if e.is_connect() {
            Error::Upstream(format!("connection failed: {}", e))
        } else {
            Error::Upstream(e.to_string())
        }
    }
}
