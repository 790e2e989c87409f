use crate::chunking::ChunkingConfig;
use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 10;
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o";

/// API key for the embedding and chat provider. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingSettings {
    pub base_url: String,
    pub model: String,
    pub batch_size: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: 0.0,
            max_tokens: 1024,
        }
    }
}

/// Pipeline configuration, built once at startup and passed by reference.
#[derive(Debug, Clone, PartialEq)]
pub struct RagConfig {
    pub index_dir: PathBuf,
    pub chunking: ChunkingConfig,
    pub top_k: usize,
    pub embedding: EmbeddingSettings,
    pub generation: GenerationSettings,
    pub retry: RetryPolicy,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("vector_db"),
            chunking: ChunkingConfig::default(),
            top_k: DEFAULT_TOP_K,
            embedding: EmbeddingSettings::default(),
            generation: GenerationSettings::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl RagConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking.validate()?;
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be at least 1".to_string()));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "embedding batch size must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry policy needs at least one attempt".to_string(),
            ));
        }
        Ok(())
    }
}
