// Knowledge base
// Ingestion, retrieval and answering over the document chunk index


use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::embeddings::{ChunkingConfig, Embedder, Generator, chunk_text};
use crate::index::{DocumentSummary, IndexManager, RemoveReport};
use crate::retriever::{QueryContext, RetrievalConfig, Retriever, SearchHit};
use crate::{DocsError, Result};

/// Outcome of ingesting one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    /// Characters of extracted text that were chunked
    pub characters: usize,
    pub chunks_added: usize,
    pub total_records: usize,
}

/// A generated answer and where it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<String>,
    pub used_fallback: bool,
    pub hits: Vec<SearchHit>,
}

/// Entry point for adding documents and asking questions about them
pub struct KnowledgeBase {
    manager: Arc<IndexManager>,
    chunking: ChunkingConfig,
    retriever: Retriever,
}

impl KnowledgeBase {
    #[inline]
    pub fn new(
        manager: Arc<IndexManager>,
        chunking: ChunkingConfig,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            manager,
            chunking,
            retriever: Retriever::new(retrieval),
        }
    }

    /// Knowledge base over the configured index directory
    #[inline]
    pub fn open(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let manager = IndexManager::open(config, embedder)?;
        Ok(Self::new(
            Arc::new(manager),
            config.chunking,
            config.retrieval.clone(),
        ))
    }

    #[inline]
    pub fn manager(&self) -> &Arc<IndexManager> {
        &self.manager
    }

    #[inline]
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Chunk `raw_text` and append it under `document_id`.
    ///
    /// Text that produces no chunks adds nothing. Ingesting the same id
    /// twice keeps both copies; remove the document first to replace it.
    #[inline]
    pub fn ingest_document(&self, document_id: &str, raw_text: &str) -> Result<IngestReport> {
        let chunks = chunk_text(raw_text, &self.chunking)?;
        debug!("{} split into {} chunks", document_id, chunks.len());

        let report = self.manager.append(&chunks, document_id)?;
        info!(
            "Ingested {} ({} chunks)",
            document_id, report.chunks_added
        );
        Ok(IngestReport {
            document_id: report.document_id,
            characters: raw_text.chars().count(),
            chunks_added: report.chunks_added,
            total_records: report.total_records,
        })
    }

    /// Embed a question with the index's embedder
    #[inline]
    pub fn embed_query(&self, question: &str) -> Result<Vec<f32>> {
        if question.trim().is_empty() {
            return Err(DocsError::InvalidInput(
                "question must not be empty".to_string(),
            ));
        }
        self.manager.embedder().embed(question)
    }

    /// Retrieve context for an already embedded question and apply the
    /// relevance gate.
    #[inline]
    pub fn query(&self, question: &str, query_vector: &[f32]) -> Result<QueryContext> {
        let snapshot = self.manager.snapshot()?;
        let hits = self.retriever.retrieve(&snapshot, query_vector)?;
        let context = self.retriever.gate().apply(hits);
        debug!(
            "Query {:?}: {} hits, fallback {}",
            question,
            context.hits.len(),
            context.used_fallback
        );
        Ok(context)
    }

    /// Remove a document. Unknown ids succeed with nothing removed.
    #[inline]
    pub fn delete_document(&self, document_id: &str) -> Result<RemoveReport> {
        self.manager.remove(document_id)
    }

    #[inline]
    pub fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        self.manager.list_documents()
    }

    /// Answer `question` from retrieved context, or from the model alone
    /// when nothing relevant is indexed.
    #[inline]
    pub fn ask(&self, question: &str, generator: &dyn Generator) -> Result<Answer> {
        let query_vector = self.embed_query(question)?;
        let context = self.query(question, &query_vector)?;

        let prompt = build_prompt(question, context.answer_context.as_deref());
        let answer = generator.generate(&prompt)?;

        Ok(Answer {
            answer: answer.trim().to_string(),
            sources: context.sources,
            used_fallback: context.used_fallback,
            hits: context.hits,
        })
    }
}

/// Prompt for the language model. With context the model is told to
/// answer from it alone; without, it answers from its own knowledge.
#[inline]
pub fn build_prompt(question: &str, context: Option<&str>) -> String {
    match context {
        Some(context) => format!(
            "You are a helpful AI assistant. Answer using ONLY the context below.\n\n\
             Context:\n{context}\n\nQuestion: {question}\n\nAnswer:"
        ),
        None => format!(
            "You are a helpful AI assistant. Answer the question as best as possible.\n\n\
             Question: {question}\n\nAnswer:"
        ),
    }
}
