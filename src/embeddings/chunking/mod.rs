#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{DocsError, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 800;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Configuration for fixed-window chunking. Sizes are in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Length of each window
    pub chunk_size: usize,
    /// Characters shared by adjacent windows
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    /// Distance between the starts of adjacent windows
    #[inline]
    pub fn stride(&self) -> usize {
        self.chunk_size.saturating_sub(self.overlap)
    }

    fn check(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(DocsError::Config(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(DocsError::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// A raw window of source text, before whitespace stripping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    /// Character offset of the first character in the window
    pub start: usize,
    /// Character offset one past the last character in the window
    pub end: usize,
    /// The window's text, exactly as it appears in the normalized source
    pub text: String,
}

impl ChunkSpan {
    #[inline]
    pub fn char_len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Walk a window of `chunk_size` characters across `text`, advancing by
/// `chunk_size - overlap` each step.
///
/// Carriage returns are replaced with spaces first. Offsets count Unicode
/// scalar values rather than bytes, so multi-byte text never splits inside
/// a character. The walk only stops once the next start is at or past the
/// end of the text, so a window that reaches the end is still followed by
/// one more window starting `chunk_size - overlap` later when that start
/// lies inside the text.
#[inline]
pub fn chunk_spans(text: &str, config: &ChunkingConfig) -> Result<Vec<ChunkSpan>> {
    config.check()?;

    let normalized: Vec<char> = text
        .chars()
        .map(|c| if c == '\r' { ' ' } else { c })
        .collect();
    let len = normalized.len();
    let stride = config.stride();

    let mut spans = Vec::with_capacity(len.div_ceil(stride));
    let mut start = 0;
    while start < len {
        let end = (start + config.chunk_size).min(len);
        spans.push(ChunkSpan {
            start,
            end,
            text: normalized[start..end].iter().collect(),
        });
        start += stride;
    }

    Ok(spans)
}

/// Split `text` into stripped, non-empty chunks ready for embedding.
///
/// Empty input gives an empty vector.
#[inline]
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Result<Vec<String>> {
    let spans = chunk_spans(text, config)?;
    let window_count = spans.len();

    let chunks: Vec<String> = spans
        .into_iter()
        .filter_map(|span| {
            let trimmed = span.text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .collect();

    debug!(
        "Chunked {} characters into {} chunks ({} blank windows skipped)",
        text.chars().count(),
        chunks.len(),
        window_count - chunks.len()
    );

    Ok(chunks)
}
