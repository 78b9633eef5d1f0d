// Embeddings module
// Chunking of document text and the embedding service client

pub mod chunking;
pub mod ollama;

pub use chunking::{Chunk, ChunkingConfig, chunk_text, reassemble};
pub use ollama::OllamaClient;

use crate::Result;

/// Maps text to fixed-length vectors.
///
/// Implementations must be deterministic for a given model: the vector for a
/// text is the same whether it is embedded alone or as part of a batch.
pub trait Embedder: Send + Sync {
    /// Identifier of the embedding model
    fn model(&self) -> &str;

    /// Length of every vector this embedder returns
    fn dimension(&self) -> usize;

    /// Embed texts, one vector per input in input order. All or nothing.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| {
                crate::RagError::EmbeddingService("empty embedding response".to_string())
            })
    }
}
