use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::llm::ApiProvider;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const CONFIG_PATH_ENV: &str = "FIRELIT_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub knowledge_base: KnowledgeBaseConfig,
    pub retrieval: RetrievalConfig,
    pub completion: CompletionConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeBaseConfig {
    pub csv_path: PathBuf,
    pub embedding_model: String,
    /// Expected vector length. Responses with another length are rejected.
    pub dimension: usize,
    /// Documents per embedding request at build time.
    pub batch_size: usize,
    /// Field separator of the CSV file. Must be a single ASCII character.
    pub delimiter: char,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub provider: ApiProvider,
    /// Model for the one grounded analysis turn.
    pub analysis_model: String,
    pub analysis_max_tokens: usize,
    /// Model for the free-chat turns that follow.
    pub chat_model: String,
    pub chat_max_tokens: usize,
    pub temperature: f32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from("data/매장요약.csv"),
            embedding_model: "text-embedding-ada-002".to_string(),
            dimension: 1536,
            batch_size: 100,
            delimiter: ',',
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { k: 3 }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: ApiProvider::OpenAI,
            analysis_model: "gpt-3.5-turbo-16k-0613".to_string(),
            analysis_max_tokens: 400,
            chat_model: "gpt-3.5-turbo".to_string(),
            chat_max_tokens: 200,
            temperature: 0.0,
            timeout_secs: 60,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl CompletionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(Error::Configuration(msg.to_string()));

        if self.knowledge_base.csv_path.as_os_str().is_empty() {
            return invalid("knowledge_base.csv_path must not be empty");
        }
        if self.knowledge_base.dimension == 0 {
            return invalid("knowledge_base.dimension must be > 0");
        }
        if self.knowledge_base.batch_size == 0 {
            return invalid("knowledge_base.batch_size must be > 0");
        }
        if !self.knowledge_base.delimiter.is_ascii() {
            return invalid("knowledge_base.delimiter must be an ASCII character");
        }
        if self.retrieval.k == 0 {
            return invalid("retrieval.k must be > 0");
        }
        if self.completion.analysis_max_tokens == 0 || self.completion.chat_max_tokens == 0 {
            return invalid("completion max tokens must be > 0");
        }
        if !(0.0..=2.0).contains(&self.completion.temperature) {
            return invalid("completion.temperature must be in [0.0, 2.0]");
        }
        if self.completion.timeout_secs == 0 {
            return invalid("completion.timeout_secs must be > 0");
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be >= 1");
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return invalid("retry.base_delay_ms must be <= retry.max_delay_ms");
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Configuration(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the config source: explicit path, then `FIRELIT_CONFIG`, then
    /// `<config dir>/firelit/config.json` if present, else built-in defaults.
    /// `OPENAI_BASE_URL` then overrides the completion endpoint whatever the source.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::resolve(explicit)?;
        config.apply_base_url(std::env::var(BASE_URL_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            if !path.trim().is_empty() {
                return Self::from_file(Path::new(&path));
            }
        }
        if let Some(path) = default_config_path().filter(|p| p.exists()) {
            tracing::info!(path = %path.display(), "Using config from user config directory");
            return Self::from_file(&path);
        }
        Ok(Self::default())
    }

    /// Point completions and embeddings at a custom OpenAI-compatible base URL.
    /// Blank values are ignored.
    pub fn apply_base_url(&mut self, base_url: Option<String>) {
        let Some(base_url) = base_url.filter(|u| !u.trim().is_empty()) else {
            return;
        };
        tracing::info!(endpoint = %base_url.trim(), "Using custom completion endpoint");
        self.completion.provider = ApiProvider::Custom {
            endpoint: base_url.trim().to_string(),
        };
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("firelit").join("config.json"))
}

/// Read the completion/embedding credential. Absent or blank is a configuration error.
pub fn api_key_from_env() -> Result<String> {
    api_key_from(std::env::var(API_KEY_ENV).ok())
}

fn api_key_from(value: Option<String>) -> Result<String> {
    match value {
        Some(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(Error::Configuration(format!("{} is not set", API_KEY_ENV))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.retrieval.k, 3);
        assert_eq!(config.completion.temperature, 0.0);
        assert_eq!(config.completion.analysis_max_tokens, 400);
        assert_eq!(config.completion.chat_max_tokens, 200);
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"knowledge_base": {{"csv_path": "data/other.csv"}}, "retrieval": {{"k": 5}}}}"#).unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.knowledge_base.csv_path, PathBuf::from("data/other.csv"));
        assert_eq!(config.knowledge_base.batch_size, 100);
        assert_eq!(config.retrieval.k, 5);
        assert_eq!(config.completion.chat_model, "gpt-3.5-turbo");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = AppConfig::default();
        config.retrieval.k = 0;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let mut config = AppConfig::default();
        config.retry.base_delay_ms = 10_000;
        config.retry.max_delay_ms = 1_000;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.knowledge_base.delimiter = '、';
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_unparseable_file_is_configuration_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            AppConfig::from_file(file.path()),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_or_blank_api_key_is_configuration_error() {
        assert!(matches!(api_key_from(None), Err(Error::Configuration(_))));
        assert!(matches!(
            api_key_from(Some("   ".into())),
            Err(Error::Configuration(msg)) if msg.contains(API_KEY_ENV)
        ));
        assert_eq!(api_key_from(Some(" sk-test \n".into())).unwrap(), "sk-test");
    }

    #[test]
    fn test_api_key_read_from_environment() {
        // Only this test touches the variable.
        std::env::set_var(API_KEY_ENV, "");
        assert!(matches!(api_key_from_env(), Err(Error::Configuration(_))));
        std::env::remove_var(API_KEY_ENV);
        assert!(matches!(api_key_from_env(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_base_url_overrides_file_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"retrieval": {{"k": 4}}}}"#).unwrap();
        let mut config = AppConfig::from_file(file.path()).unwrap();

        config.apply_base_url(Some("  ".into()));
        assert_eq!(config.completion.provider, ApiProvider::OpenAI);

        config.apply_base_url(Some("http://localhost:8000/v1 ".into()));
        assert_eq!(
            config.completion.provider,
            ApiProvider::Custom {
                endpoint: "http://localhost:8000/v1".into()
            }
        );
        assert_eq!(config.retrieval.k, 4);
    }
}
