// Pipeline module
// The knowledge base handle that ties loading, chunking, embedding, indexing and answering together


use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::answer::{ChatCompletionsClient, LanguageModel, compose_answer};
use crate::config::Config;
use crate::documents::{Document, load_document, load_document_file};
use crate::embeddings::{ChunkingConfig, Embedder, OllamaClient, chunk_text};
use crate::index::{IndexStore, open_index_store};
use crate::retrieval::{Retrieval, retrieve};
use crate::{RagError, Result};

pub const NOT_READY_MESSAGE: &str = "Knowledge base is not ready. Please upload a document first.";
pub const ERROR_MESSAGE: &str = "An error occurred while processing your question.";
pub const UPLOAD_FAILED_MESSAGE: &str = "Failed to process the document.";

const DEFAULT_TOP_K: usize = 5;

/// Outcome of a successful ingestion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub filename: String,
    /// Length of the extracted text in characters
    pub characters: usize,
    pub chunks: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Nothing has been ingested yet
    NotReady,
    Answered {
        text: String,
        /// Distinct source filenames of the chunks used, most relevant first
        sources: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeBaseStatus {
    pub backend: &'static str,
    pub index_exists: bool,
    pub entries: usize,
}

/// Handle over one knowledge base.
///
/// Built once at start-up and shared by reference; every method takes
/// `&self`, so concurrent uploads and questions need no outside locking.
pub struct KnowledgeBase {
    embedder: Box<dyn Embedder>,
    index: Box<dyn IndexStore>,
    model: Option<Box<dyn LanguageModel>>,
    chunking: ChunkingConfig,
    top_k: usize,
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("embedding_model", &self.embedder.model())
            .field("backend", &self.index.backend_name())
            .field("language_model", &self.model.as_ref().map(|m| m.model()))
            .field("chunking", &self.chunking)
            .field("top_k", &self.top_k)
            .finish()
    }
}

impl KnowledgeBase {
    #[inline]
    pub fn new(embedder: Box<dyn Embedder>, index: Box<dyn IndexStore>) -> Self {
        Self {
            embedder,
            index,
            model: None,
            chunking: ChunkingConfig::default(),
            top_k: DEFAULT_TOP_K,
        }
    }

    #[inline]
    pub fn with_language_model(mut self, model: Box<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    #[inline]
    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    #[inline]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Build the services named in `config`.
    ///
    /// A missing language model key is not fatal here: uploads and status
    /// still work, and questions fail with an answer generation error.
    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let embedder = OllamaClient::new(&config.embedding)?;
        let index = open_index_store(config)?;
        let mut knowledge_base = Self::new(Box::new(embedder), index)
            .with_chunking(config.chunking.clone())
            .with_top_k(config.retrieval.top_k as usize);

        match ChatCompletionsClient::from_config(&config.llm) {
            Ok(client) => knowledge_base = knowledge_base.with_language_model(Box::new(client)),
            Err(e) => warn!("Language model unavailable, questions will fail: {}", e),
        }

        Ok(knowledge_base)
    }

    /// Load, chunk, embed and store one uploaded document.
    ///
    /// Nothing is written to the index unless every step before it succeeded.
    #[inline]
    pub fn ingest(&self, filename: &str, bytes: &[u8]) -> Result<IngestReport> {
        let document = load_document(filename, bytes)?;
        self.ingest_document(&document)
    }

    #[inline]
    pub fn ingest_file(&self, path: &Path) -> Result<IngestReport> {
        let document = load_document_file(path)?;
        self.ingest_document(&document)
    }

    fn ingest_document(&self, document: &Document) -> Result<IngestReport> {
        if document.text.trim().is_empty() {
            return Err(RagError::document_load(
                &document.filename,
                "no text could be extracted",
            ));
        }

        let chunks = chunk_text(&document.text, &document.filename, &self.chunking)?;
        debug!("Split {} into {} chunks", document.filename, chunks.len());

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts)?;
        if vectors.len() != chunks.len() {
            return Err(RagError::EmbeddingService(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                vectors.len()
            )));
        }

        self.index.upsert(&chunks, &vectors)?;
        info!(
            "Added {} chunks from {} to the {} index",
            chunks.len(),
            document.filename,
            self.index.backend_name()
        );

        Ok(IngestReport {
            filename: document.filename.clone(),
            characters: document.text.chars().count(),
            chunks: chunks.len(),
        })
    }

    /// Answer `question` from the stored chunks
    #[inline]
    pub fn ask(&self, question: &str) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidInput("question must not be empty".to_string()));
        }

        let hits = match retrieve(question, self.embedder.as_ref(), self.index.as_ref(), self.top_k)? {
            Retrieval::NotReady => return Ok(Answer::NotReady),
            Retrieval::Chunks(hits) => hits,
        };

        let model = self.model.as_deref().ok_or_else(|| {
            RagError::AnswerGeneration("no language model is configured".to_string())
        })?;
        let text = compose_answer(hits.iter().map(|hit| &hit.chunk), question, model)?;

        let mut sources: Vec<String> = Vec::new();
        for hit in &hits {
            if !sources.contains(&hit.chunk.source) {
                sources.push(hit.chunk.source.clone());
            }
        }

        Ok(Answer::Answered { text, sources })
    }

    /// The reply a user sees for `question`; failures are logged, never shown
    #[inline]
    pub fn respond(&self, question: &str) -> String {
        match self.ask(question) {
            Ok(Answer::Answered { text, .. }) => text,
            Ok(Answer::NotReady) => NOT_READY_MESSAGE.to_string(),
            Err(e) => {
                error!("Error during question answering: {}", e);
                ERROR_MESSAGE.to_string()
            }
        }
    }

    /// The reply a user sees after uploading `filename`
    #[inline]
    pub fn upload_message(filename: &str, result: &Result<IngestReport>) -> String {
        match result {
            Ok(_) => format!("File '{}' processed and added to the knowledge base.", filename),
            Err(e) => {
                error!("Error processing {}: {}", filename, e);
                UPLOAD_FAILED_MESSAGE.to_string()
            }
        }
    }

    #[inline]
    pub fn status(&self) -> Result<KnowledgeBaseStatus> {
        let index_exists = self.index.exists()?;
        let entries = if index_exists { self.index.count()? } else { 0 };

        Ok(KnowledgeBaseStatus {
            backend: self.index.backend_name(),
            index_exists,
            entries,
        })
    }
}
