// Configuration management module
// TOML settings for the embedding service, language model, chunking and index backend

pub mod settings;


pub use settings::{
    Config, ConfigError, EmbeddingConfig, IndexBackend, IndexConfig, LlmConfig,
    LocalIndexConfig, RemoteIndexConfig, RetrievalConfig,
};

use std::path::PathBuf;

/// Environment variable that overrides the configuration directory
pub const CONFIG_DIR_ENV: &str = "DOC_QA_CONFIG_DIR";

/// Get the configuration directory path
///
/// `DOC_QA_CONFIG_DIR` wins over the platform config directory.
#[inline]
pub fn get_config_dir() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    dirs::config_dir()
        .map(|dir| dir.join("doc-qa"))
        .ok_or(ConfigError::DirectoryError)
}
