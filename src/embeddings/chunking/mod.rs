
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ConfigError;

/// A contiguous span of document text ready for embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// The chunk text
    pub text: String,
    /// Filename of the document the chunk was cut from
    pub source: String,
    /// Position of this chunk within its document
    pub index: usize,
    /// Character offset of the first character in the document
    pub start: usize,
}

impl Chunk {
    /// Length in characters
    #[inline]
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Configuration for content chunking. Sizes are counted in characters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length
    pub max_size: usize,
    /// Characters shared by consecutive chunks
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_size: 1000,
            overlap: 200,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn new(max_size: usize, overlap: usize) -> Self {
        Self { max_size, overlap }
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::InvalidMaxChunkSize(self.max_size));
        }

        if self.overlap >= self.max_size {
            return Err(ConfigError::InvalidOverlapSize(self.overlap, self.max_size));
        }

        Ok(())
    }
}

/// Split document text into overlapping chunks.
///
/// Every chunk holds at most `max_size` characters and each chunk after the
/// first begins `overlap` characters before the end of its predecessor, so
/// dropping those leading characters and concatenating gives back `text`.
/// Cuts prefer a paragraph break, then a line break, then a sentence end,
/// then any whitespace, and only fall back to a hard cut at `max_size`.
#[inline]
pub fn chunk_text(
    text: &str,
    source: &str,
    config: &ChunkingConfig,
) -> Result<Vec<Chunk>, ConfigError> {
    config.validate()?;

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = text.chars().collect();
    let chunks: Vec<Chunk> = split_spans(&chars, config)
        .into_iter()
        .enumerate()
        .map(|(index, (start, end))| Chunk {
            text: chars[start..end].iter().collect(),
            source: source.to_string(),
            index,
            start,
        })
        .collect();

    debug!(
        "Chunked '{}' into {} chunks ({} chars, max {}, overlap {})",
        source,
        chunks.len(),
        chars.len(),
        config.max_size,
        config.overlap
    );

    Ok(chunks)
}

/// Rebuild the original text from chunks produced with `overlap`
#[inline]
pub fn reassemble(chunks: &[Chunk], overlap: usize) -> String {
    let mut text = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            text.push_str(&chunk.text);
        } else {
            text.extend(chunk.text.chars().skip(overlap));
        }
    }
    text
}

/// Compute `[start, end)` character spans for each chunk
fn split_spans(chars: &[char], config: &ChunkingConfig) -> Vec<(usize, usize)> {
    let total = chars.len();
    let mut spans = Vec::new();
    let mut start = 0;

    loop {
        let window_end = (start + config.max_size).min(total);
        if window_end == total {
            spans.push((start, total));
            break;
        }

        // The next chunk starts at `end - overlap`, which must move past `start`
        let min_end = start + config.overlap + 1;
        let end = find_break_point(chars, min_end, window_end, config.max_size);
        spans.push((start, end));
        start = end - config.overlap;
    }

    spans
}

/// Find a natural break point in the trailing fifth of the window.
///
/// Returns an exclusive end offset in `min_end..=target_end`.
fn find_break_point(chars: &[char], min_end: usize, target_end: usize, max_size: usize) -> usize {
    let search_start = target_end.saturating_sub(max_size / 5).max(min_end);

    let mut paragraph = None;
    let mut newline = None;
    let mut sentence = None;
    let mut space = None;

    for end in search_start..=target_end {
        let last = chars[end - 1];
        let before = end.checked_sub(2).map(|i| chars[i]);

        if last == '\n' {
            if before == Some('\n') {
                paragraph = Some(end);
            }
            newline = Some(end);
        }

        if last.is_whitespace() {
            if matches!(before, Some('.' | '!' | '?')) {
                sentence = Some(end);
            }
            space = Some(end);
        }
    }

    paragraph
        .or(newline)
        .or(sentence)
        .or(space)
        .unwrap_or(target_end)
}
