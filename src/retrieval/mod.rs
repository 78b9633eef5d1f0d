// Retrieval module
// Embeds a question and pulls the nearest chunks from the index


use tracing::{debug, info};

use crate::embeddings::{Chunk, Embedder};
use crate::index::{IndexStore, QueryOutcome, ScoredChunk};
use crate::{RagError, Result};

/// Chunks retrieved for a question
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    /// Nothing has been ingested yet
    NotReady,
    /// Most similar chunks first; may be empty when `k` is zero
    Chunks(Vec<ScoredChunk>),
}

impl Retrieval {
    /// Retrieved chunks, empty when the index is not ready
    #[inline]
    pub fn chunks(&self) -> Vec<&Chunk> {
        match self {
            Self::NotReady => Vec::new(),
            Self::Chunks(hits) => hits.iter().map(|hit| &hit.chunk).collect(),
        }
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Chunks(_))
    }
}

/// Find the `k` stored chunks closest to `question`.
///
/// The index is checked before the question is embedded so an empty
/// knowledge base never touches the embedding service.
#[inline]
pub fn retrieve(
    question: &str,
    embedder: &dyn Embedder,
    index: &dyn IndexStore,
    k: usize,
) -> Result<Retrieval> {
    if question.trim().is_empty() {
        return Err(RagError::InvalidInput("question must not be empty".to_string()));
    }

    if !index.exists()? {
        debug!("No {} index yet, skipping retrieval", index.backend_name());
        return Ok(Retrieval::NotReady);
    }

    let vector = embedder.embed(question)?;
    if vector.len() != embedder.dimension() {
        return Err(RagError::EmbeddingService(format!(
            "question embedding has {} dimensions, expected {}",
            vector.len(),
            embedder.dimension()
        )));
    }

    match index.query(&vector, k)? {
        QueryOutcome::NotReady => Ok(Retrieval::NotReady),
        QueryOutcome::Matches(hits) => {
            info!("Retrieved {} chunks for question", hits.len());
            Ok(Retrieval::Chunks(hits))
        }
    }
}
