
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::time::SystemTime;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{IndexStore, QueryOutcome, rank_by_similarity, validate_dimensions, validate_upsert};
use crate::embeddings::Chunk;
use crate::{RagError, Result};

const INDEX_FORMAT_VERSION: u32 = 1;

/// Upsert guards shared by every store in the process that points at the same file
static PATH_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// One stored chunk and its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub vector: Vec<f32>,
    pub chunk: Chunk,
    pub inserted_at: DateTime<Utc>,
}

/// On-disk layout of the whole index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexFile {
    pub version: u32,
    /// Embedding model the vectors came from, when known
    pub model: Option<String>,
    pub dimension: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub entries: Vec<IndexEntry>,
}

impl IndexFile {
    fn new(dimension: usize, model: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            version: INDEX_FORMAT_VERSION,
            model,
            dimension,
            created_at: now,
            updated_at: now,
            entries: Vec::new(),
        }
    }
}

/// Modification time and length of the file a cached copy was read from
type Fingerprint = (SystemTime, u64);

#[derive(Debug)]
struct CachedIndex {
    fingerprint: Fingerprint,
    file: Arc<IndexFile>,
}

/// Index kept in a single JSON file.
///
/// Every upsert rewrites the whole file through a temporary file and an
/// atomic rename, so readers only ever see complete versions.
#[derive(Debug)]
pub struct LocalIndexStore {
    path: PathBuf,
    dimension: usize,
    model: Option<String>,
    cache: Mutex<Option<CachedIndex>>,
}

impl LocalIndexStore {
    #[inline]
    pub fn new<P: Into<PathBuf>>(path: P, dimension: usize) -> Self {
        Self {
            path: path.into(),
            dimension,
            model: None,
            cache: Mutex::new(None),
        }
    }

    /// Record the embedding model and refuse to mix vectors from another one
    #[inline]
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the full index, reusing the cached copy while the file is unchanged
    #[inline]
    pub fn load(&self) -> Result<Option<Arc<IndexFile>>> {
        let metadata = match std::fs::metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.set_cache(None);
                return Ok(None);
            }
            Err(e) => return Err(self.unavailable("Failed to stat index file", e)),
        };

        let fingerprint = (
            metadata
                .modified()
                .map_err(|e| self.unavailable("Failed to read index modification time", e))?,
            metadata.len(),
        );

        {
            let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(cached) = cache.as_ref().filter(|c| c.fingerprint == fingerprint) {
                return Ok(Some(Arc::clone(&cached.file)));
            }
        }

        debug!("Reading index file {}", self.path.display());
        let content = std::fs::read(&self.path)
            .map_err(|e| self.unavailable("Failed to read index file", e))?;
        let file: IndexFile = serde_json::from_slice(&content)
            .map_err(|e| self.unavailable("Index file is corrupt", e))?;

        if file.version != INDEX_FORMAT_VERSION {
            return Err(RagError::IndexUnavailable(format!(
                "{} has unsupported format version {}",
                self.path.display(),
                file.version
            )));
        }

        let file = Arc::new(file);
        self.set_cache(Some(CachedIndex {
            fingerprint,
            file: Arc::clone(&file),
        }));
        Ok(Some(file))
    }

    fn save(&self, file: &IndexFile) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .map_err(|e| self.unavailable("Failed to create index directory", e))?;

        let json = serde_json::to_vec(file)
            .map_err(|e| self.unavailable("Failed to serialize index", e))?;

        let mut temp = NamedTempFile::new_in(dir)
            .map_err(|e| self.unavailable("Failed to create temporary index file", e))?;
        temp.write_all(&json)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| self.unavailable("Failed to write temporary index file", e))?;
        temp.persist(&self.path)
            .map_err(|e| self.unavailable("Failed to replace index file", e.error))?;

        Ok(())
    }

    fn check_compatible(&self, file: &IndexFile) -> Result<()> {
        if file.dimension != self.dimension {
            return Err(RagError::IndexConfiguration(format!(
                "{} was created with {}-dimensional vectors, configured dimension is {}",
                self.path.display(),
                file.dimension,
                self.dimension
            )));
        }

        match (&file.model, &self.model) {
            (Some(stored), Some(configured)) if stored != configured => {
                Err(RagError::IndexConfiguration(format!(
                    "{} was built with embedding model '{}', configured model is '{}'",
                    self.path.display(),
                    stored,
                    configured
                )))
            }
            _ => Ok(()),
        }
    }

    fn set_cache(&self, value: Option<CachedIndex>) {
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = value;
    }

    fn unavailable(&self, what: &str, error: impl std::fmt::Display) -> RagError {
        RagError::IndexUnavailable(format!("{} {}: {}", what, self.path.display(), error))
    }
}

fn path_lock(path: &Path) -> Arc<Mutex<()>> {
    let key = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut locks = PATH_LOCKS.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(locks.entry(key).or_default())
}

impl IndexStore for LocalIndexStore {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    fn exists(&self) -> Result<bool> {
        self.path
            .try_exists()
            .map_err(|e| self.unavailable("Failed to check index file", e))
    }

    fn upsert(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        validate_upsert(chunks, vectors, self.dimension)?;
        if chunks.is_empty() {
            return Ok(());
        }

        let lock = path_lock(&self.path);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut file = match self.load()? {
            Some(existing) => {
                self.check_compatible(&existing)?;
                IndexFile::clone(&existing)
            }
            None => {
                info!("Creating index file {}", self.path.display());
                IndexFile::new(self.dimension, self.model.clone())
            }
        };

        let now = Utc::now();
        file.entries
            .extend(chunks.iter().zip(vectors).map(|(chunk, vector)| IndexEntry {
                id: Uuid::new_v4().to_string(),
                vector: vector.clone(),
                chunk: chunk.clone(),
                inserted_at: now,
            }));
        file.updated_at = now;

        self.save(&file)?;
        debug!(
            "Appended {} entries to {} ({} total)",
            chunks.len(),
            self.path.display(),
            file.entries.len()
        );

        // Drop the cache; the next read picks up the new fingerprint
        self.set_cache(None);
        Ok(())
    }

    fn query(&self, vector: &[f32], k: usize) -> Result<QueryOutcome> {
        let Some(file) = self.load()? else {
            debug!("Index file {} does not exist yet", self.path.display());
            return Ok(QueryOutcome::NotReady);
        };

        if file.entries.is_empty() {
            warn!("Index file {} has no entries", self.path.display());
            return Ok(QueryOutcome::NotReady);
        }

        self.check_compatible(&file)?;
        validate_dimensions([vector.len()], file.dimension)?;

        let ranked = rank_by_similarity(
            vector,
            file.entries
                .iter()
                .map(|entry| (entry.vector.as_slice(), &entry.chunk)),
            k,
        );
        Ok(QueryOutcome::Matches(ranked))
    }

    fn count(&self) -> Result<usize> {
        Ok(self.load()?.map_or(0, |file| file.entries.len()))
    }
}
