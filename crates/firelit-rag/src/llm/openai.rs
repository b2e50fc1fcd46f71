//! OpenAI-compatible chat completion provider

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{ApiProvider, ChatMessage, CompletionProvider, GenerationConfig};
use crate::error::{Error, Result};

pub struct OpenAIProvider {
    provider: ApiProvider,
    api_key: String,
    client: Client,
}

impl OpenAIProvider {
    pub fn new(provider: ApiProvider, api_key: String, timeout: Duration) -> Result<Self> {
        let client = build_client(timeout)?;

        tracing::info!(
            provider = provider.name(),
            timeout_secs = timeout.as_secs(),
            "Creating OpenAIProvider"
        );

        Ok(Self {
            provider,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAIProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
    ) -> Result<ChatMessage> {
        let endpoint = self.provider.chat_endpoint();
        tracing::debug!(
            endpoint = %endpoint,
            model = %config.model,
            max_tokens = config.max_tokens,
            messages = messages.len(),
            "Sending chat completion request"
        );

        let request = json!({
            "model": config.model,
            "messages": messages,
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
            "stream": false
        });

        let response = self
            .client
            .post(&endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(endpoint = %endpoint, error = %e, "Chat request failed");
                Error::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(endpoint = %endpoint, status = %status, "API returned error");
            return Err(status_error(status, &headers, &body));
        }

        let result: ChatCompletionResponse = parse_json_response(response, &endpoint).await?;
        into_message(result, config)
    }

    fn name(&self) -> String {
        self.provider.name().to_string()
    }
}

/// Take the first choice. A `length` finish reason becomes `ContentTruncated`
/// carrying whatever text was generated.
fn into_message(
    response: ChatCompletionResponse,
    config: &GenerationConfig,
) -> Result<ChatMessage> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::Upstream("No choices returned from API".to_string()))?;

    let content = choice.message.content.unwrap_or_default();
    if choice.finish_reason.as_deref() == Some("length") {
        tracing::warn!(
            model = %config.model,
            max_tokens = config.max_tokens,
            "Completion truncated at max_tokens"
        );
        return Err(Error::ContentTruncated { partial: content });
    }

    tracing::debug!(chars = content.chars().count(), "API response received");
    Ok(ChatMessage::assistant(content))
}

pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(15))
        .timeout(timeout)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_nodelay(true)
        .build()
        .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {}", e)))
}

/// Map a non-success HTTP status onto the error taxonomy.
pub(crate) fn status_error(status: StatusCode, headers: &HeaderMap, body: &str) -> Error {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Error::RateLimited {
            retry_after: parse_retry_after(headers),
        };
    }
    let preview: String = body.chars().take(300).collect();
    Error::Upstream(format!("API error ({}): {}", status, preview))
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Parse a response body as JSON, returning a clear error if the server returned HTML
/// (e.g. a gateway error page) instead of valid JSON.
pub(crate) async fn parse_json_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    endpoint: &str,
) -> Result<T> {
    let status = response.status();
    let body = response.text().await.map_err(|e| {
        Error::Upstream(format!("Failed to read response body from {}: {}", endpoint, e))
    })?;
    parse_json_body(&body, status, endpoint)
}

pub(crate) fn parse_json_body<T: serde::de::DeserializeOwned>(
    body: &str,
    status: StatusCode,
    endpoint: &str,
) -> Result<T> {
    // CDNs and proxies sometimes answer 200 with an HTML page
    let trimmed = body.trim_start();
    if trimmed.starts_with('<') {
        let preview: String = trimmed.chars().take(200).collect();
        return Err(Error::Upstream(format!(
            "Endpoint {} returned HTML instead of JSON (HTTP {}): {}",
            endpoint, status, preview
        )));
    }

    serde_json::from_str::<T>(body).map_err(|e| {
        let preview: String = body.chars().take(300).collect();
        Error::Upstream(format!(
            "Failed to parse JSON from {} (HTTP {}): {}. Response body: {}",
            endpoint, status, e, preview
        ))
    })
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_429_maps_to_rate_limited_with_hint() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        let err = status_error(StatusCode::TOO_MANY_REQUESTS, &headers, "");
        match err {
            Error::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_secs(7)))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_auth_and_server_errors_are_upstream() {
        let headers = HeaderMap::new();
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, &headers, "bad key"),
            Error::Upstream(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, &headers, ""),
            Error::Upstream(_)
        ));
    }

    #[test]
    fn test_html_body_is_rejected() {
        let result: Result<ChatCompletionResponse> =
            parse_json_body("<html>502</html>", StatusCode::OK, "http://x");
        assert!(matches!(result, Err(Error::Upstream(msg)) if msg.contains("HTML")));
    }

    fn parse(body: &str) -> ChatCompletionResponse {
        parse_json_body(body, StatusCode::OK, "http://x").unwrap()
    }

    fn config() -> GenerationConfig {
        GenerationConfig {
            model: "gpt-3.5-turbo".into(),
            temperature: 0.0,
            max_tokens: 200,
        }
    }

    #[test]
    fn test_length_finish_is_truncation_with_partial_text() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"장전동 한식은"},"finish_reason":"length"}]}"#;
        match into_message(parse(body), &config()) {
            Err(Error::ContentTruncated { partial }) => assert_eq!(partial, "장전동 한식은"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_stop_finish_is_assistant_reply() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"분석 결과"},"finish_reason":"stop"}]}"#;
        let message = into_message(parse(body), &config()).unwrap();
        assert_eq!(message, ChatMessage::assistant("분석 결과"));
    }

    #[test]
    fn test_empty_choices_is_upstream_error() {
        let result = into_message(parse(r#"{"choices":[]}"#), &config());
        assert!(matches!(result, Err(Error::Upstream(msg)) if msg.contains("No choices")));
    }
}
