// Document chunk index
// Flat inner-product index, its on-disk record store and the manager that
// keeps metadata, embeddings and index slots aligned across mutations

pub mod consistency;
pub mod flat;
pub mod manager;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DocsError, Result};

pub use consistency::{ConsistencyReport, ConsistencyValidator};
pub use flat::{FlatIndex, Neighbors};
pub use manager::{AppendReport, IndexManager, RemoveReport};
pub use store::RecordStore;

/// Metadata for one indexed chunk, stored one per line in `metadata.jsonl`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Identifier assigned at append time. Not a position: slots shift when
    /// documents are removed, ids do not.
    pub chunk_id: u64,
    /// Stripped chunk text
    pub text: String,
    /// Owning document, e.g. the uploaded file name
    pub document_id: String,
    /// When the owning document was appended
    #[serde(default)]
    pub ingested_at: DateTime<Utc>,
}

/// One distinct document currently present in the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSummary {
    pub document_id: String,
    pub chunk_count: usize,
    pub ingested_at: DateTime<Utc>,
}

/// The three aligned artifacts that make up the index state.
///
/// Position `i` of `metadata`, row `i` of `embeddings` and slot `i` of the
/// similarity index always describe the same chunk. Construction goes
/// through [`IndexSnapshot::from_parts`], which rejects misaligned input.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSnapshot {
    index: FlatIndex,
    metadata: Vec<ChunkRecord>,
    embeddings: Vec<f32>,
}

impl IndexSnapshot {
    #[inline]
    pub fn empty(dimension: usize) -> Self {
        Self {
            index: FlatIndex::new(dimension),
            metadata: Vec::new(),
            embeddings: Vec::new(),
        }
    }

    /// Assemble a snapshot, failing with `StorageCorruption` when the
    /// metadata count, embedding rows and index size disagree.
    #[inline]
    pub fn from_parts(
        index: FlatIndex,
        metadata: Vec<ChunkRecord>,
        embeddings: Vec<f32>,
    ) -> Result<Self> {
        let dimension = index.dimension();
        if dimension == 0 {
            return Err(DocsError::Config(
                "index dimension must be greater than zero".to_string(),
            ));
        }
        if embeddings.len() % dimension != 0 {
            return Err(DocsError::StorageCorruption(format!(
                "embedding matrix holds {} values, not a multiple of dimension {}",
                embeddings.len(),
                dimension
            )));
        }
        let embedding_rows = embeddings.len() / dimension;
        if metadata.len() != embedding_rows || embedding_rows != index.len() {
            return Err(DocsError::StorageCorruption(format!(
                "artifact lengths disagree: {} metadata records, {} embedding rows, {} index entries",
                metadata.len(),
                embedding_rows,
                index.len()
            )));
        }
        Ok(Self {
            index,
            metadata,
            embeddings,
        })
    }

    #[inline]
    pub fn into_parts(self) -> (FlatIndex, Vec<ChunkRecord>, Vec<f32>) {
        (self.index, self.metadata, self.embeddings)
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    #[inline]
    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    #[inline]
    pub fn metadata(&self) -> &[ChunkRecord] {
        &self.metadata
    }

    /// Row-major `[len, dimension]` embedding matrix
    #[inline]
    pub fn embeddings(&self) -> &[f32] {
        &self.embeddings
    }

    #[inline]
    pub fn embedding(&self, position: usize) -> Option<&[f32]> {
        let dimension = self.dimension();
        self.embeddings
            .get(position * dimension..(position + 1) * dimension)
    }

    /// Distinct documents in order of first appearance
    #[inline]
    pub fn documents(&self) -> Vec<DocumentSummary> {
        let mut summaries: Vec<DocumentSummary> = Vec::new();
        for record in &self.metadata {
            match summaries
                .iter_mut()
                .find(|s| s.document_id == record.document_id)
            {
                Some(summary) => {
                    summary.chunk_count += 1;
                    summary.ingested_at = summary.ingested_at.max(record.ingested_at);
                }
                None => summaries.push(DocumentSummary {
                    document_id: record.document_id.clone(),
                    chunk_count: 1,
                    ingested_at: record.ingested_at,
                }),
            }
        }
        summaries
    }

    #[inline]
    pub fn contains_document(&self, document_id: &str) -> bool {
        self.metadata.iter().any(|m| m.document_id == document_id)
    }
}

/// Scale `vector` to unit L2 length. Returns `None` for a zero vector or one
/// containing non-finite values.
#[inline]
pub fn normalize(vector: &[f32]) -> Option<Vec<f32>> {
    let norm = vector
        .iter()
        .map(|v| f64::from(*v).powi(2))
        .sum::<f64>()
        .sqrt();
    if !norm.is_finite() || norm <= f64::EPSILON {
        return None;
    }
    Some(
        vector
            .iter()
            .map(|v| (f64::from(*v) / norm) as f32)
            .collect(),
    )
}

/// Inner product, accumulated in f64
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum::<f64>() as f32
}
