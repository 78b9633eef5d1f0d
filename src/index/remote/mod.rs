#[cfg(test)]
mod tests;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::{IndexStore, QueryOutcome, ScoredChunk, validate_dimensions, validate_upsert};
use crate::config::RemoteIndexConfig;
use crate::embeddings::Chunk;
use crate::{RagError, Result};

const API_VERSION: &str = "2024-07";

/// Extra matches requested beyond `k` so ties at the cut-off are decided by
/// insertion order here rather than by the service
const TIE_SLACK: usize = 10;

/// Index hosted by a Pinecone-compatible vector service
#[derive(Debug, Clone)]
pub struct RemoteIndexStore {
    control_url: Url,
    host: Url,
    index_name: String,
    namespace: String,
    dimension: usize,
    batch_size: usize,
    api_key: String,
    agent: ureq::Agent,
}

#[derive(Debug, Deserialize)]
struct DescribeIndexResponse {
    name: String,
    dimension: usize,
    #[serde(default)]
    status: Option<IndexStatus>,
}

#[derive(Debug, Deserialize)]
struct IndexStatus {
    ready: bool,
}

/// Per-vector metadata; `inserted_at` and `position` order equal scores
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMetadata {
    text: String,
    source: String,
    chunk_index: usize,
    start: usize,
    inserted_at: i64,
    position: usize,
}

#[derive(Debug, Serialize)]
struct UpsertVector<'a> {
    id: String,
    values: &'a [f32],
    metadata: EntryMetadata,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector<'a>>,
    namespace: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    upserted_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    namespace: &'a str,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    score: f32,
    metadata: Option<EntryMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexStatsResponse {
    #[serde(default)]
    namespaces: HashMap<String, NamespaceStats>,
    #[serde(default)]
    total_vector_count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceStats {
    vector_count: usize,
}

impl RemoteIndexStore {
    #[inline]
    pub fn new(config: &RemoteIndexConfig, api_key: String) -> Result<Self> {
        let host = config
            .host
            .as_deref()
            .ok_or_else(|| RagError::IndexConfiguration("remote index host is not set".to_string()))?;
        let host = Url::parse(host)
            .map_err(|e| RagError::IndexConfiguration(format!("invalid index host {}: {}", host, e)))?;
        let control_url = Url::parse(&config.control_url).map_err(|e| {
            RagError::IndexConfiguration(format!(
                "invalid control URL {}: {}",
                config.control_url, e
            ))
        })?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build()
            .into();

        Ok(Self {
            control_url,
            host,
            index_name: config.index_name.clone(),
            namespace: config.namespace.clone(),
            dimension: config.dimension as usize,
            batch_size: (config.batch_size as usize).max(1),
            api_key,
            agent,
        })
    }

    #[inline]
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    fn endpoint(base: &Url, path: &str) -> Result<Url> {
        let joined = format!("{}/{}", base.as_str().trim_end_matches('/'), path);
        Url::parse(&joined)
            .map_err(|e| RagError::IndexConfiguration(format!("invalid endpoint {}: {}", joined, e)))
    }

    fn get(&self, url: &Url) -> std::result::Result<String, ureq::Error> {
        self.agent
            .get(url.as_str())
            .header("Api-Key", self.api_key.as_str())
            .header("X-Pinecone-API-Version", API_VERSION)
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
    }

    fn post<T: Serialize>(&self, url: &Url, body: &T) -> Result<String> {
        let request_json = serde_json::to_string(body)
            .context("Failed to serialize index request")?;

        self.agent
            .post(url.as_str())
            .header("Api-Key", self.api_key.as_str())
            .header("X-Pinecone-API-Version", API_VERSION)
            .header("Content-Type", "application/json")
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| request_error(url, &e))
    }

    fn describe_index(&self) -> Result<Option<DescribeIndexResponse>> {
        let url = Self::endpoint(&self.control_url, &format!("indexes/{}", self.index_name))?;
        debug!("Describing index {} at {}", self.index_name, url);

        match self.get(&url) {
            Ok(body) => {
                let description = parse_response(&url, &body)?;
                Ok(Some(description))
            }
            Err(ureq::Error::StatusCode(404)) => Ok(None),
            Err(e) => Err(request_error(&url, &e)),
        }
    }
}

/// A body that does not parse means the index cannot be read
fn parse_response<T: DeserializeOwned>(url: &Url, body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| {
        RagError::IndexUnavailable(format!("unreadable response from {}: {}", url, e))
    })
}

/// Map transport failures onto the error taxonomy
fn request_error(url: &Url, error: &ureq::Error) -> RagError {
    match error {
        ureq::Error::StatusCode(400 | 422) => RagError::IndexConfiguration(format!(
            "index service rejected request to {}: {}",
            url, error
        )),
        _ => RagError::IndexUnavailable(format!("request to {} failed: {}", url, error)),
    }
}

impl IndexStore for RemoteIndexStore {
    fn backend_name(&self) -> &'static str {
        "remote"
    }

    fn exists(&self) -> Result<bool> {
        let Some(description) = self.describe_index()? else {
            return Ok(false);
        };

        if description.dimension != self.dimension {
            return Err(RagError::IndexConfiguration(format!(
                "index '{}' has dimension {}, configured dimension is {}",
                description.name, description.dimension, self.dimension
            )));
        }

        let ready = description.status.is_none_or(|status| status.ready);
        if !ready {
            warn!("Index '{}' exists but is not ready yet", description.name);
        }
        Ok(ready)
    }

    fn upsert(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        validate_upsert(chunks, vectors, self.dimension)?;
        if chunks.is_empty() {
            return Ok(());
        }

        let url = Self::endpoint(&self.host, "vectors/upsert")?;
        let inserted_at = chrono::Utc::now().timestamp_micros();
        let entries: Vec<(usize, &Chunk, &Vec<f32>)> = chunks
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(position, (chunk, vector))| (position, chunk, vector))
            .collect();

        let mut upserted = 0;
        for batch in entries.chunks(self.batch_size) {
            let request = UpsertRequest {
                vectors: batch
                    .iter()
                    .map(|(position, chunk, vector)| UpsertVector {
                        id: Uuid::new_v4().to_string(),
                        values: vector.as_slice(),
                        metadata: EntryMetadata {
                            text: chunk.text.clone(),
                            source: chunk.source.clone(),
                            chunk_index: chunk.index,
                            start: chunk.start,
                            inserted_at,
                            position: *position,
                        },
                    })
                    .collect(),
                namespace: &self.namespace,
            };

            let body = self.post(&url, &request)?;
            let response: UpsertResponse = parse_response(&url, &body)?;
            upserted += response.upserted_count;
        }

        if upserted != chunks.len() {
            warn!(
                "Index '{}' acknowledged {} of {} vectors",
                self.index_name,
                upserted,
                chunks.len()
            );
        }

        info!(
            "Upserted {} vectors into index '{}'",
            upserted, self.index_name
        );
        Ok(())
    }

    fn query(&self, vector: &[f32], k: usize) -> Result<QueryOutcome> {
        validate_dimensions([vector.len()], self.dimension)?;

        if !self.exists()? {
            debug!("Index '{}' does not exist yet", self.index_name);
            return Ok(QueryOutcome::NotReady);
        }

        if k == 0 {
            return Ok(QueryOutcome::Matches(Vec::new()));
        }

        let url = Self::endpoint(&self.host, "query")?;
        let request = QueryRequest {
            vector,
            top_k: k.saturating_add(TIE_SLACK),
            namespace: &self.namespace,
            include_metadata: true,
            include_values: false,
        };
        let body = self.post(&url, &request)?;
        let response: QueryResponse = parse_response(&url, &body)?;

        if response.matches.is_empty() {
            debug!("Index '{}' returned no matches", self.index_name);
            return Ok(QueryOutcome::NotReady);
        }

        let mut hits = Vec::with_capacity(response.matches.len());
        for hit in response.matches {
            let metadata = hit.metadata.ok_or_else(|| {
                RagError::IndexUnavailable(format!("match {} carries no metadata", hit.id))
            })?;
            hits.push((hit.score, metadata));
        }

        hits.sort_by(|(score_a, a), (score_b, b)| {
            score_b
                .total_cmp(score_a)
                .then(a.inserted_at.cmp(&b.inserted_at))
                .then(a.position.cmp(&b.position))
        });
        hits.truncate(k);

        Ok(QueryOutcome::Matches(
            hits.into_iter()
                .map(|(score, metadata)| ScoredChunk {
                    chunk: Chunk {
                        text: metadata.text,
                        source: metadata.source,
                        index: metadata.chunk_index,
                        start: metadata.start,
                    },
                    score,
                })
                .collect(),
        ))
    }

    fn count(&self) -> Result<usize> {
        if !self.exists()? {
            return Ok(0);
        }

        let url = Self::endpoint(&self.host, "describe_index_stats")?;
        let body = self.post(&url, &serde_json::json!({}))?;
        let stats: IndexStatsResponse = parse_response(&url, &body)?;

        let fallback = if self.namespace.is_empty() {
            stats.total_vector_count
        } else {
            0
        };
        Ok(stats
            .namespaces
            .get(&self.namespace)
            .map_or(fallback, |ns| ns.vector_count))
    }
}
