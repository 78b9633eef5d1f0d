// Vector index module
// Append-only chunk storage with cosine-similarity retrieval, on local disk or a managed service


pub mod local;
pub mod remote;

pub use local::LocalIndexStore;
pub use remote::RemoteIndexStore;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{Config, IndexBackend};
use crate::embeddings::Chunk;
use crate::{RagError, Result};

/// A stored chunk returned by a query, with its similarity to the query vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Result of querying an index
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// No index exists yet, or it holds no entries
    NotReady,
    /// Up to `k` hits, most similar first
    Matches(Vec<ScoredChunk>),
}

impl QueryOutcome {
    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Matches(_))
    }
}

/// Durable collection of (vector, chunk) entries.
///
/// Entries are only ever appended. `query` on an index that does not exist or
/// is empty reports [`QueryOutcome::NotReady`] instead of failing.
pub trait IndexStore: Send + Sync {
    /// Short name of the backend for status output
    fn backend_name(&self) -> &'static str;

    /// Whether the index has been created
    fn exists(&self) -> Result<bool>;

    /// Append one entry per chunk; `vectors[i]` is the embedding of `chunks[i]`
    fn upsert(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()>;

    /// The `k` entries most similar to `vector`, ties broken by insertion order
    fn query(&self, vector: &[f32], k: usize) -> Result<QueryOutcome>;

    /// Number of stored entries
    fn count(&self) -> Result<usize>;
}

/// Build the backend selected by `[index] backend`
#[inline]
pub fn open_index_store(config: &Config) -> Result<Box<dyn IndexStore>> {
    let dimension = config.embedding.dimension as usize;

    match config.index.backend {
        IndexBackend::Local => {
            let path = config.local_index_path();
            debug!("Using local index at {}", path.display());
            Ok(Box::new(
                LocalIndexStore::new(path, dimension).with_model(&config.embedding.model),
            ))
        }
        IndexBackend::Remote => {
            config.index.remote.validate()?;
            let api_key = config.index.remote.api_key()?;
            debug!(
                "Using remote index '{}' in namespace '{}'",
                config.index.remote.index_name, config.index.remote.namespace
            );
            Ok(Box::new(RemoteIndexStore::new(&config.index.remote, api_key)?))
        }
    }
}

/// Cosine similarity; zero-length vectors are dissimilar to everything
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b) {
        dot = x.mul_add(*y, dot);
        norm_a = x.mul_add(*x, norm_a);
        norm_b = y.mul_add(*y, norm_b);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Score candidates given in insertion order and keep the best `k`.
///
/// The sort is stable, so equal scores keep their insertion order.
pub(crate) fn rank_by_similarity<'a, I>(query: &[f32], candidates: I, k: usize) -> Vec<ScoredChunk>
where
    I: IntoIterator<Item = (&'a [f32], &'a Chunk)>,
{
    let mut scored: Vec<ScoredChunk> = candidates
        .into_iter()
        .map(|(vector, chunk)| ScoredChunk {
            chunk: chunk.clone(),
            score: cosine_similarity(query, vector),
        })
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(k);
    scored
}

/// Reject upserts whose shapes do not fit an index of `dimension`
pub(crate) fn validate_upsert(chunks: &[Chunk], vectors: &[Vec<f32>], dimension: usize) -> Result<()> {
    if chunks.len() != vectors.len() {
        return Err(RagError::IndexConfiguration(format!(
            "{} chunks were given with {} vectors",
            chunks.len(),
            vectors.len()
        )));
    }

    validate_dimensions(vectors.iter().map(Vec::len), dimension)
}

pub(crate) fn validate_dimensions<I>(lengths: I, dimension: usize) -> Result<()>
where
    I: IntoIterator<Item = usize>,
{
    match lengths.into_iter().find(|len| *len != dimension) {
        Some(len) => Err(RagError::IndexConfiguration(format!(
            "vector has {} dimensions but the index expects {}",
            len, dimension
        ))),
        None => Ok(()),
    }
}
