// Embeddings module
// Chunking of raw text and the model capabilities the index consumes

pub mod chunking;
pub mod ollama;

pub use chunking::{ChunkSpan, ChunkingConfig, chunk_spans, chunk_text};
pub use ollama::OllamaClient;

use crate::Result;

/// Turns text into fixed-length vectors.
///
/// Implementations must be deterministic for a fixed model version. The
/// index normalizes whatever comes back, so raw model output is fine.
pub trait Embedder: Send + Sync {
    /// Dimension the embedder is known to produce, if it knows up front.
    fn dimension(&self) -> Option<usize> {
        None
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts; the output is index-aligned with `texts`.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Produces free text from a prompt.
pub trait Generator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String>;
}
