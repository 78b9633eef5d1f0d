use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Failed to load document '{file}': {message}")]
    DocumentLoad { file: String, message: String },

    #[error("Embedding service error: {0}")]
    EmbeddingService(String),

    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Index configuration error: {0}")]
    IndexConfiguration(String),

    #[error("Answer generation failed: {0}")]
    AnswerGeneration(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    #[inline]
    pub fn document_load(file: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::DocumentLoad {
            file: file.into(),
            message: message.to_string(),
        }
    }
}

pub mod answer;
pub mod commands;
pub mod config;
pub mod documents;
pub mod embeddings;
pub mod index;
pub mod pipeline;
pub mod retrieval;

#[cfg(test)]
pub(crate) mod testing;
