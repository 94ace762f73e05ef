
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tracing::{debug, info};

use crate::config::Config;
use crate::embeddings::Embedder;
use crate::index::{
    ChunkRecord, DocumentSummary, FlatIndex, IndexSnapshot, RecordStore, normalize,
};
use crate::{DocsError, Result};

/// Outcome of appending one document's chunks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendReport {
    pub document_id: String,
    pub chunks_added: usize,
    /// Id given to the first new chunk, `None` when nothing was added
    pub first_chunk_id: Option<u64>,
    pub total_records: usize,
}

/// Outcome of removing a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveReport {
    pub document_id: String,
    pub chunks_removed: usize,
    pub total_records: usize,
}

/// Owns the persisted index and serializes every mutation of it.
///
/// Each mutation is a full load, modify, save cycle under the write side of
/// `lock`. Reads take the shared side, so a load never overlaps the
/// directory swap of a save made through the same manager. Readers call
/// [`snapshot`](Self::snapshot) and keep working against that immutable
/// copy while later writes land.
pub struct IndexManager {
    store: RecordStore,
    embedder: Arc<dyn Embedder>,
    dimension: usize,
    lock: RwLock<()>,
}

impl IndexManager {
    #[inline]
    pub fn new(store: RecordStore, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let dimension = store.dimension();
        match embedder.dimension() {
            Some(found) if found != dimension => {
                return Err(DocsError::DimensionMismatch {
                    expected: dimension,
                    found,
                });
            }
            _ => {}
        }
        Ok(Self {
            store,
            embedder,
            dimension,
            lock: RwLock::new(()),
        })
    }

    #[inline]
    pub fn open(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        Self::new(RecordStore::open(config)?, embedder)
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    #[inline]
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Load the current persisted state
    #[inline]
    pub fn snapshot(&self) -> Result<Arc<IndexSnapshot>> {
        Ok(Arc::new(self.load_shared()?))
    }

    #[inline]
    pub fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        Ok(self.load_shared()?.documents())
    }

    #[inline]
    pub fn record_count(&self) -> Result<usize> {
        Ok(self.load_shared()?.len())
    }

    /// Embed `chunks` and append them under `document_id`.
    ///
    /// Embedding happens before the writer lock is taken. Records already
    /// in the index are left untouched; new ones get ids starting at the
    /// current record count.
    #[inline]
    pub fn append(&self, chunks: &[String], document_id: &str) -> Result<AppendReport> {
        if document_id.trim().is_empty() {
            return Err(DocsError::InvalidInput(
                "document id must not be empty".to_string(),
            ));
        }
        if chunks.is_empty() {
            debug!("No chunks to append for {}", document_id);
            return Ok(AppendReport {
                document_id: document_id.to_string(),
                chunks_added: 0,
                first_chunk_id: None,
                total_records: self.record_count()?,
            });
        }

        let vectors = self.embed_chunks(chunks)?;

        let _guard = self.lock_writer();
        let (mut index, mut metadata, mut embeddings) = self.store.load()?.into_parts();

        let first_chunk_id = metadata.len() as u64;
        let ingested_at = Utc::now();
        for (offset, (text, vector)) in chunks.iter().zip(vectors.iter()).enumerate() {
            metadata.push(ChunkRecord {
                chunk_id: first_chunk_id + offset as u64,
                text: text.clone(),
                document_id: document_id.to_string(),
                ingested_at,
            });
            embeddings.extend_from_slice(vector);
            index.add(vector)?;
        }

        let snapshot = IndexSnapshot::from_parts(index, metadata, embeddings)?;
        self.store.save(&snapshot)?;

        info!(
            "Appended {} chunks for {} ({} records total)",
            chunks.len(),
            document_id,
            snapshot.len()
        );
        Ok(AppendReport {
            document_id: document_id.to_string(),
            chunks_added: chunks.len(),
            first_chunk_id: Some(first_chunk_id),
            total_records: snapshot.len(),
        })
    }

    /// Remove every record belonging to `document_id`.
    ///
    /// The similarity index has no deletion, so the kept rows are copied
    /// into a new index. This is O(N) in the total record count. Removing
    /// an unknown document succeeds without touching the files.
    #[inline]
    pub fn remove(&self, document_id: &str) -> Result<RemoveReport> {
        let _guard = self.lock_writer();
        let current = self.store.load()?;

        let keep: Vec<usize> = current
            .metadata()
            .iter()
            .enumerate()
            .filter(|(_, record)| record.document_id != document_id)
            .map(|(position, _)| position)
            .collect();
        let chunks_removed = current.len() - keep.len();

        if chunks_removed == 0 {
            debug!("{} is not indexed, nothing to remove", document_id);
            return Ok(RemoveReport {
                document_id: document_id.to_string(),
                chunks_removed: 0,
                total_records: current.len(),
            });
        }

        let next = if keep.is_empty() {
            IndexSnapshot::empty(self.dimension)
        } else {
            let mut metadata = Vec::with_capacity(keep.len());
            let mut embeddings = Vec::with_capacity(keep.len() * self.dimension);
            for &position in &keep {
                metadata.push(current.metadata()[position].clone());
                let row = current.embedding(position).ok_or_else(|| {
                    DocsError::StorageCorruption(format!("embedding row {} is missing", position))
                })?;
                embeddings.extend_from_slice(row);
            }
            let index = FlatIndex::from_vectors(self.dimension, embeddings.clone())?;
            IndexSnapshot::from_parts(index, metadata, embeddings)?
        };
        self.store.save(&next)?;

        info!(
            "Removed {} chunks of {} ({} records remain)",
            chunks_removed,
            document_id,
            next.len()
        );
        Ok(RemoveReport {
            document_id: document_id.to_string(),
            chunks_removed,
            total_records: next.len(),
        })
    }

    fn embed_chunks(&self, chunks: &[String]) -> Result<Vec<Vec<f32>>> {
        let raw = self.embedder.embed_batch(chunks)?;
        if raw.len() != chunks.len() {
            return Err(DocsError::Embedding(format!(
                "embedder returned {} vectors for {} chunks",
                raw.len(),
                chunks.len()
            )));
        }

        raw.iter()
            .enumerate()
            .map(|(i, vector)| {
                if vector.len() != self.dimension {
                    return Err(DocsError::DimensionMismatch {
                        expected: self.dimension,
                        found: vector.len(),
                    });
                }
                normalize(vector).ok_or_else(|| {
                    DocsError::Embedding(format!("chunk {} embedded to a zero vector", i))
                })
            })
            .collect()
    }

    fn load_shared(&self) -> Result<IndexSnapshot> {
        let _guard = self.lock_reader();
        self.store.load()
    }

    // The lock guards no data, so poisoning carries no state
    fn lock_reader(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_writer(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write().unwrap_or_else(PoisonError::into_inner)
    }
}
