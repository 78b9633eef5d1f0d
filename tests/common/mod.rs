// Shared helpers for integration tests

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::sync::Mutex;

use doc_qa::answer::LanguageModel;
use doc_qa::embeddings::Embedder;
use doc_qa::{RagError, Result};

pub const DIMENSION: usize = 32;

/// Bag-of-words vector; each lowercase word adds one to a bucket picked by its bytes
pub fn hash_embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; DIMENSION];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let bucket = word
            .to_lowercase()
            .bytes()
            .fold(7_usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
        vector[bucket % DIMENSION] += 1.0;
    }
    vector
}

#[derive(Debug, Default)]
pub struct HashingEmbedder;

impl Embedder for HashingEmbedder {
    fn model(&self) -> &str {
        "hashing"
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_embed(t)).collect())
    }
}

/// Answers with the first context line mentioning a word of the question,
/// or the not-in-context sentinel
#[derive(Debug, Default)]
pub struct ExtractiveModel {
    pub calls: Mutex<usize>,
}

impl ExtractiveModel {
    pub fn calls(&self) -> usize {
        *self.calls.lock().expect("call counter should not be poisoned")
    }
}

fn section<'a>(prompt: &'a str, header: &str, next: &str) -> &'a str {
    prompt
        .split_once(header)
        .and_then(|(_, rest)| rest.split_once(next))
        .map_or("", |(body, _)| body.trim())
}

impl LanguageModel for ExtractiveModel {
    fn model(&self) -> &str {
        "extractive"
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        *self.calls.lock().map_err(|_| RagError::AnswerGeneration("poisoned".to_string()))? += 1;

        let context = section(prompt, "Context:\n", "\n\nQuestion:");
        let question = section(prompt, "Question:\n", "\n\nAnswer:");
        let keywords: Vec<String> = question
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 3)
            .map(str::to_lowercase)
            .collect();

        Ok(context
            .lines()
            .find(|line| {
                let line = line.to_lowercase();
                keywords.iter().any(|k| line.contains(k.as_str()))
            })
            .map_or_else(
                || doc_qa::answer::NOT_IN_CONTEXT.to_string(),
                |line| line.trim().to_string(),
            ))
    }
}
