
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::embeddings::chunking::ChunkingConfig;

pub const DEFAULT_EMBEDDING_MODEL: &str = "all-minilm";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 384;
pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Ollama server that produces the embeddings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
    pub dimension: u32,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            batch_size: 16,
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            timeout_secs: 30,
        }
    }
}

/// OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_tokens: Option<u32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama3-8b-8192".to_string(),
            temperature: 0.3,
            api_key_env: "GROQ_API_KEY".to_string(),
            timeout_secs: 60,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    #[default]
    Local,
    Remote,
}

impl std::fmt::Display for IndexBackend {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexConfig {
    pub backend: IndexBackend,
    pub local: LocalIndexConfig,
    pub remote: RemoteIndexConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LocalIndexConfig {
    /// Index file; defaults to `index.json` in the config directory
    pub path: Option<PathBuf>,
}

/// Pinecone-style managed index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RemoteIndexConfig {
    /// Control plane used to describe the index
    pub control_url: String,
    /// Data plane host of the index, e.g. `https://rag-qa-index-abc123.svc.pinecone.io`
    pub host: Option<String>,
    pub index_name: String,
    pub namespace: String,
    pub dimension: u32,
    pub api_key_env: String,
    pub batch_size: u32,
    pub timeout_secs: u64,
}

impl Default for RemoteIndexConfig {
    fn default() -> Self {
        Self {
            control_url: "https://api.pinecone.io".to_string(),
            host: None,
            index_name: "rag-qa-index".to_string(),
            namespace: String::new(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            api_key_env: "PINECONE_API_KEY".to_string(),
            batch_size: 100,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 2 and 8192)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid max chunk size: {0} (must be at least 1)")]
    InvalidMaxChunkSize(usize),
    #[error("Invalid overlap size: {0} (must be smaller than the max chunk size {1})")]
    InvalidOverlapSize(usize, usize),
    #[error("Invalid top_k: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("Invalid temperature: {0} (must be between 0 and 2)")]
    InvalidTemperature(f32),
    #[error("Remote index requires `{0}` to be set")]
    MissingRemoteSetting(&'static str),
    #[error("Remote index dimension ({index}) does not match embedding dimension ({embedding})")]
    DimensionMismatch { index: u32, embedding: u32 },
    #[error("Environment variable {0} is not set")]
    MissingApiKey(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Defaults rooted at `base_dir`
    #[inline]
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self::with_base_dir(config_dir));
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedding.validate()?;
        self.llm.validate()?;
        self.chunking.validate()?;

        if !(1..=100).contains(&self.retrieval.top_k) {
            return Err(ConfigError::InvalidTopK(self.retrieval.top_k));
        }

        if self.index.backend == IndexBackend::Remote {
            self.index.remote.validate()?;
            if self.index.remote.dimension != self.embedding.dimension {
                return Err(ConfigError::DimensionMismatch {
                    index: self.index.remote.dimension,
                    embedding: self.embedding.dimension,
                });
            }
        }

        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Path of the local index file
    #[inline]
    pub fn local_index_path(&self) -> PathBuf {
        self.index
            .local
            .path
            .clone()
            .unwrap_or_else(|| self.get_base_dir().join("index.json"))
    }

    #[inline]
    pub fn embedding_url(&self) -> Result<Url, ConfigError> {
        self.embedding.embedding_url()
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        self.embedding_url()?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(2..=8192).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }

        Ok(())
    }

    pub fn embedding_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }
}

impl LlmConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.base_url)
            .map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidProtocol(url.scheme().to_string()));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }

        Ok(())
    }

    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Result<String, ConfigError> {
        read_api_key(&self.api_key_env)
    }
}

impl RemoteIndexConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let host = self
            .host
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .ok_or(ConfigError::MissingRemoteSetting("index.remote.host"))?;
        Url::parse(host).map_err(|_| ConfigError::InvalidUrl(host.to_string()))?;
        Url::parse(&self.control_url)
            .map_err(|_| ConfigError::InvalidUrl(self.control_url.clone()))?;

        if self.index_name.trim().is_empty() {
            return Err(ConfigError::MissingRemoteSetting("index.remote.index_name"));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(2..=8192).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }

        Ok(())
    }

    pub fn api_key(&self) -> Result<String, ConfigError> {
        read_api_key(&self.api_key_env)
    }
}

fn read_api_key(var: &str) -> Result<String, ConfigError> {
    std::env::var(var)
        .ok()
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .ok_or_else(|| ConfigError::MissingApiKey(var.to_string()))
}
