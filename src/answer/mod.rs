// Answer composition module
// Turns retrieved chunks and a question into one language-model call


pub mod chat;

pub use chat::ChatCompletionsClient;

use tracing::debug;

use crate::embeddings::Chunk;
use crate::{RagError, Result};

/// Reply the model is told to give when the context does not hold the answer
pub const NOT_IN_CONTEXT: &str = "The answer is not available in the context";

/// Generates text from a prompt
pub trait LanguageModel: Send + Sync {
    fn model(&self) -> &str;

    /// One completion for `prompt`
    fn complete(&self, prompt: &str) -> Result<String>;
}

/// Chunk texts in retrieval order, separated by a blank line
#[inline]
pub fn format_context<'a, I>(chunks: I) -> String
where
    I: IntoIterator<Item = &'a Chunk>,
{
    chunks
        .into_iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[inline]
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "Answer the question as detailed as possible from the provided context. \
         If the answer is not in the provided context, just say, \"{NOT_IN_CONTEXT}\". \
         Do not provide a wrong answer.\n\n\
         Context:\n{context}\n\n\
         Question:\n{question}\n\n\
         Answer:\n"
    )
}

/// Ask `model` to answer `question` from `chunks` alone.
///
/// Exactly one model call is made. Any failure becomes
/// [`RagError::AnswerGeneration`].
#[inline]
pub fn compose_answer<'a, I>(chunks: I, question: &str, model: &dyn LanguageModel) -> Result<String>
where
    I: IntoIterator<Item = &'a Chunk>,
{
    let context = format_context(chunks);
    let prompt = build_prompt(&context, question);
    debug!(
        "Composing answer with {} ({} context characters)",
        model.model(),
        context.chars().count()
    );

    match model.complete(&prompt) {
        Ok(answer) => Ok(answer.trim().to_string()),
        Err(RagError::AnswerGeneration(message)) => Err(RagError::AnswerGeneration(message)),
        Err(e) => Err(RagError::AnswerGeneration(e.to_string())),
    }
}
