// Deterministic stand-ins for the embedding and chat services

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::answer::LanguageModel;
use crate::embeddings::Embedder;
use crate::{RagError, Result};

pub(crate) const TEST_DIMENSION: usize = 16;

/// Bag-of-words embedder: every word lands in a bucket picked by its bytes
#[derive(Debug, Default)]
pub(crate) struct HashingEmbedder {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl HashingEmbedder {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub(crate) fn hash_embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; TEST_DIMENSION];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let bucket = word
            .to_lowercase()
            .bytes()
            .fold(7_usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
        vector[bucket % TEST_DIMENSION] += 1.0;
    }
    vector
}

impl Embedder for HashingEmbedder {
    fn model(&self) -> &str {
        "hashing-test"
    }

    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RagError::EmbeddingService("connection refused".to_string()));
        }
        Ok(texts.iter().map(|t| hash_embed(t)).collect())
    }
}

/// Language model that replies with a fixed text and records its prompts
#[derive(Debug)]
pub(crate) struct ScriptedModel {
    reply: std::result::Result<String, String>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub(crate) fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt log should not be poisoned").clone()
    }
}

impl LanguageModel for ScriptedModel {
    fn model(&self) -> &str {
        "scripted-test"
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .expect("prompt log should not be poisoned")
            .push(prompt.to_string());
        self.reply.clone().map_err(RagError::AnswerGeneration)
    }
}
