use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{ChatMessage, CompletionProvider, GenerationConfig};
use crate::config::RetryConfig;
use crate::error::{Error, Result};

/// Exponential backoff for throttled requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    /// A server-provided hint wins over the computed backoff; both are capped.
    pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let computed = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        hint.unwrap_or(computed).min(self.max_delay)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

/// Wraps a provider with a per-attempt timeout and rate-limit retries.
///
/// Only `Error::RateLimited` is retried. Timeouts surface as `Error::Upstream`.
pub struct RetryingProvider {
    inner: Arc<dyn CompletionProvider>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn CompletionProvider>, policy: RetryPolicy, timeout: Duration) -> Self {
        Self { inner, policy, timeout }
    }

    async fn attempt(&self, messages: &[ChatMessage], config: &GenerationConfig) -> Result<ChatMessage> {
        match tokio::time::timeout(self.timeout, self.inner.complete(messages, config)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Upstream(format!(
                "{} did not respond within {:?}",
                self.inner.name(),
                self.timeout
            ))),
        }
    }
}

#[async_trait]
impl CompletionProvider for RetryingProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
    ) -> Result<ChatMessage> {
        let mut attempt = 1;
        loop {
            match self.attempt(messages, config).await {
                Err(Error::RateLimited { retry_after }) if attempt < self.policy.max_attempts => {
                    let backoff = self.policy.delay_for(attempt, retry_after);
                    tracing::warn!(
                        provider = %self.inner.name(),
                        attempt,
                        "Rate limited, retrying in {:?}",
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn name(&self) -> String {
        self.inner.name()
    }
}
