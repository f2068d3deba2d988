use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CHUNK_SIZE: usize = 1_000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;
pub const DEFAULT_BATCH_SIZE: usize = 20;
pub const DEFAULT_TOP_K: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub batch_size: usize,
    pub top_k: usize,
    /// Worker count for page classification and chunking. `None` uses every core.
    pub workers: Option<usize>,
    /// When false the worker count is capped at 1.
    pub parallel: bool,
    pub index_path: PathBuf,
    pub doc_map_path: PathBuf,
    pub request_timeout_secs: u64,
    pub embedder: EmbedderSettings,
    pub responder: ResponderSettings,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            batch_size: DEFAULT_BATCH_SIZE,
            top_k: DEFAULT_TOP_K,
            workers: None,
            parallel: true,
            index_path: PathBuf::from("data/output/index.bin"),
            doc_map_path: PathBuf::from("data/output/doc_map.json"),
            request_timeout_secs: 60,
            embedder: EmbedderSettings::default(),
            responder: ResponderSettings::default(),
        }
    }
}

impl RagConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_size must be positive".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk_overlap {} must be smaller than chunk_size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.batch_size == 0 {
            return Err(IngestError::InvalidArgument(
                "batch_size must be positive".to_string(),
            ));
        }
        if self.top_k == 0 {
            return Err(IngestError::InvalidArgument(
                "top_k must be positive".to_string(),
            ));
        }
        if self.workers == Some(0) {
            return Err(IngestError::InvalidArgument(
                "workers must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        if !self.parallel {
            return 1;
        }
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderProvider {
    #[default]
    Local,
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmbedderSettings {
    pub provider: EmbedderProvider,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    /// Only used by the local embedder; remote dimensions come from the model.
    pub dimensions: usize,
}

impl Default for EmbedderSettings {
    fn default() -> Self {
        Self {
            provider: EmbedderProvider::Local,
            model: "text-embedding-3-small".to_string(),
            base_url: "https://api.openai.com/v1/".to_string(),
            api_key: None,
            dimensions: crate::embeddings::DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponderProvider {
    #[default]
    Extractive,
    OpenAi,
    Grok,
}

impl ResponderProvider {
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Extractive => "",
            Self::OpenAi => "https://api.openai.com/v1/",
            Self::Grok => "https://api.x.ai/v1/",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::Extractive => "extractive",
            Self::OpenAi => "gpt-3.5-turbo",
            Self::Grok => "grok-1",
        }
    }

    pub fn credential_env(self) -> Option<&'static str> {
        match self {
            Self::Extractive => None,
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Grok => Some("GROK_API_KEY"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResponderSettings {
    pub provider: ResponderProvider,
    /// Falls back to the provider default when unset.
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ResponderSettings {
    fn default() -> Self {
        Self {
            provider: ResponderProvider::Extractive,
            model: None,
            base_url: None,
            api_key: None,
            temperature: 0.5,
            max_tokens: 1_000,
        }
    }
}

/// Returns a trimmed, non-empty value for `configured`, falling back to `env_var`.
pub(crate) fn resolve_credential(configured: Option<&str>, env_var: &str) -> Option<String> {
    configured
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
        .or_else(|| std::env::var(env_var).ok())
        .and_then(|value| {
            let key = value.trim().to_string();
            if key.is_empty() {
                None
            } else {
                Some(key)
            }
        })
}
