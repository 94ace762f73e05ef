// Retrieval over a loaded index snapshot
// Ranks chunks for a query embedding and decides whether they are good
// enough to answer from


use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::index::{IndexSnapshot, normalize};
use crate::{DocsError, Result};

/// Source reported when no retrieved chunk clears the relevance threshold
pub const MODEL_KNOWLEDGE_SOURCE: &str = "model knowledge only";

const DEFAULT_TOP_K: usize = 5;
const DEFAULT_RELEVANCE_THRESHOLD: f32 = 0.60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks to retrieve per query
    pub top_k: usize,
    /// Minimum best-hit similarity for answering from retrieved context
    pub relevance_threshold: f32,
}

impl Default for RetrievalConfig {
    #[inline]
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            relevance_threshold: DEFAULT_RELEVANCE_THRESHOLD,
        }
    }
}

/// One ranked chunk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub score: f32,
    pub text: String,
    pub document_id: String,
    pub chunk_id: u64,
    /// Slot in the snapshot the hit came from
    pub position: usize,
}

/// What a caller needs to build a prompt for one question
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryContext {
    /// Hit texts joined by blank lines, `None` when falling back
    pub answer_context: Option<String>,
    /// Distinct documents behind the context, or [`MODEL_KNOWLEDGE_SOURCE`]
    pub sources: Vec<String>,
    pub used_fallback: bool,
    /// Every hit that was retrieved, whether or not it passed the gate
    pub hits: Vec<SearchHit>,
}

/// Exact top-k search over a snapshot
#[derive(Debug, Clone)]
pub struct Retriever {
    config: RetrievalConfig,
}

impl Retriever {
    #[inline]
    pub fn new(config: RetrievalConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    #[inline]
    pub fn gate(&self) -> RelevanceGate {
        RelevanceGate::new(self.config.relevance_threshold)
    }

    /// Search with the configured `top_k`
    #[inline]
    pub fn retrieve(&self, snapshot: &IndexSnapshot, query: &[f32]) -> Result<Vec<SearchHit>> {
        self.search(snapshot, query, self.config.top_k)
    }

    /// Rank the `top_k` records most similar to `query`.
    ///
    /// Hits come back by descending score with ties going to the lower
    /// position. Fewer than `top_k` hits are returned when the index is
    /// smaller than that.
    #[inline]
    pub fn search(
        &self,
        snapshot: &IndexSnapshot,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        if snapshot.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != snapshot.dimension() {
            return Err(DocsError::DimensionMismatch {
                expected: snapshot.dimension(),
                found: query.len(),
            });
        }
        let query = normalize(query).ok_or_else(|| {
            DocsError::Embedding("query embedded to a zero vector".to_string())
        })?;

        let neighbors = snapshot.index().search(&query, top_k)?;
        let hits: Vec<SearchHit> = neighbors
            .valid()
            .filter_map(|(position, score)| {
                snapshot.metadata().get(position).map(|record| SearchHit {
                    score,
                    text: record.text.clone(),
                    document_id: record.document_id.clone(),
                    chunk_id: record.chunk_id,
                    position,
                })
            })
            .collect();

        debug!(
            "Retrieved {} hits, best score {:?}",
            hits.len(),
            hits.first().map(|h| h.score)
        );
        Ok(hits)
    }
}

/// Threshold test on the best hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevanceGate {
    threshold: f32,
}

impl RelevanceGate {
    #[inline]
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    #[inline]
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Only the best score is compared with the threshold. When it passes,
    /// every hit contributes to the context, including ones scoring below
    /// the threshold.
    #[inline]
    pub fn apply(&self, hits: Vec<SearchHit>) -> QueryContext {
        let passes = hits
            .first()
            .is_some_and(|best| best.score >= self.threshold);

        if !passes {
            debug!("No hit clears threshold {}, using fallback", self.threshold);
            return QueryContext {
                answer_context: None,
                sources: vec![MODEL_KNOWLEDGE_SOURCE.to_string()],
                used_fallback: true,
                hits,
            };
        }

        let answer_context = hits.iter().map(|hit| hit.text.as_str()).join("\n\n");
        let sources = hits
            .iter()
            .map(|hit| hit.document_id.clone())
            .unique()
            .collect();

        QueryContext {
            answer_context: Some(answer_context),
            sources,
            used_fallback: false,
            hits,
        }
    }
}
