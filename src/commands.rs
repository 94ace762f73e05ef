use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::DocsError;
use crate::config::Config;
use crate::embeddings::OllamaClient;
use crate::index::ConsistencyValidator;
use crate::knowledge::KnowledgeBase;

fn open_knowledge_base(config: &Config) -> Result<(KnowledgeBase, Arc<OllamaClient>)> {
    let client =
        Arc::new(OllamaClient::new(&config.ollama).context("Failed to initialize Ollama client")?);
    let embedder = Arc::clone(&client);
    let kb = KnowledgeBase::open(config, embedder).context("Failed to open the document index")?;
    Ok((kb, client))
}

fn spinner(message: &str) -> ProgressBar {
    if !console::user_attended_stderr() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner().with_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Ingest a plain text file into the index
#[inline]
pub fn add_document(
    config: &Config,
    path: &Path,
    name: Option<String>,
    replace: bool,
) -> Result<()> {
    let document_id = match name {
        Some(name) => name,
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow::anyhow!("Cannot derive a document name from {}", path.display()))?,
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    info!("Adding document {} from {}", document_id, path.display());
    let (kb, _) = open_knowledge_base(config)?;

    let existing = kb
        .list_documents()?
        .into_iter()
        .find(|d| d.document_id == document_id);
    if let Some(existing) = existing {
        if !replace {
            println!(
                "Document already indexed: {} ({} chunks)",
                existing.document_id, existing.chunk_count
            );
            println!("Use --replace to re-index it.");
            return Ok(());
        }
        let removed = kb.delete_document(&document_id)?;
        println!("Removed {} old chunks of {}", removed.chunks_removed, document_id);
    }

    let bar = spinner(&format!("Indexing {}", document_id));
    let result = kb.ingest_document(&document_id, &text);
    bar.finish_and_clear();
    let report = result.with_context(|| format!("Failed to index {}", document_id))?;

    if report.chunks_added == 0 {
        println!("No text found in {}; nothing was indexed.", path.display());
    } else {
        println!("✅ Indexed {}", report.document_id);
        println!("   Characters: {}", report.characters);
        println!("   Chunks: {}", report.chunks_added);
        println!("   Total records: {}", report.total_records);
    }
    Ok(())
}

/// Answer a question from the indexed documents
#[inline]
pub fn ask_question(config: &Config, question: &str) -> Result<()> {
    let (kb, client) = open_knowledge_base(config)?;

    let bar = spinner("Thinking");
    let result = kb.ask(question, client.as_ref());
    bar.finish_and_clear();
    let answer = result.context("Failed to answer question")?;

    println!("{}", answer.answer);
    println!();
    if answer.used_fallback {
        println!("Sources: {}", answer.sources.join(", "));
    } else {
        println!("Sources:");
        for source in &answer.sources {
            println!("  📄 {}", source);
        }
    }
    Ok(())
}

/// Show the chunks that best match a query, without calling the language model
#[inline]
pub fn search_index(config: &Config, query: &str, top_k: Option<usize>) -> Result<()> {
    let (kb, _) = open_knowledge_base(config)?;
    let top_k = top_k.unwrap_or(kb.retriever().config().top_k);

    let vector = kb.embed_query(query).context("Failed to embed query")?;
    let snapshot = kb.manager().snapshot()?;
    let hits = kb.retriever().search(&snapshot, &vector, top_k)?;

    if hits.is_empty() {
        println!("No indexed content. Use 'docs-rag add <file>' to add a document.");
        return Ok(());
    }

    let threshold = kb.retriever().config().relevance_threshold;
    for (rank, hit) in hits.iter().enumerate() {
        let marker = if hit.score >= threshold { "✅" } else { "  " };
        println!(
            "{} {}. [{:.3}] {} (chunk {})",
            marker,
            rank + 1,
            hit.score,
            hit.document_id,
            hit.chunk_id
        );
        let preview: String = hit.text.chars().take(200).collect();
        println!("      {}", preview.replace('\n', " "));
    }
    Ok(())
}

/// List every indexed document
#[inline]
pub fn list_documents(config: &Config) -> Result<()> {
    let (kb, _) = open_knowledge_base(config)?;
    let documents = kb.list_documents()?;

    if documents.is_empty() {
        println!("No documents have been added yet.");
        println!("Use 'docs-rag add <file>' to add a document.");
        return Ok(());
    }

    println!("Documents ({} total):", documents.len());
    println!();
    for document in &documents {
        println!("📄 {}", document.document_id);
        println!("   Chunks: {}", document.chunk_count);
        println!(
            "   Added: {}",
            document.ingested_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    Ok(())
}

/// Remove a document and all of its chunks
#[inline]
pub fn delete_document(config: &Config, document_id: &str) -> Result<()> {
    let (kb, _) = open_knowledge_base(config)?;

    if !kb
        .list_documents()?
        .iter()
        .any(|d| d.document_id == document_id)
    {
        return Err(DocsError::DocumentNotFound(document_id.to_string()).into());
    }

    let report = kb.delete_document(document_id)?;
    println!("Document deleted: {}", report.document_id);
    println!("✓ {} chunks removed", report.chunks_removed);
    println!("✓ {} records remain", report.total_records);
    Ok(())
}

/// Check the persisted index for consistency
#[inline]
pub fn verify_index(config: &Config, reembed: bool) -> Result<()> {
    let (kb, client) = open_knowledge_base(config)?;
    let snapshot = kb.manager().snapshot()?;
    let validator = ConsistencyValidator::new(&snapshot);

    let report = if reembed {
        let bar = spinner(&format!("Re-embedding {} chunks", snapshot.len()));
        let result = validator.validate_with_reembedding(client.as_ref());
        bar.finish_and_clear();
        result.context("Failed to re-embed chunks")?
    } else {
        validator.validate()
    };

    println!("{}", report.summary());
    if let Some(min) = report.min_reembed_similarity {
        println!("Lowest re-embedding similarity: {:.4}", min);
    }
    if !report.duplicate_chunk_ids.is_empty() {
        println!(
            "Note: {} chunk ids are shared by more than one record",
            report.duplicate_chunk_ids.len()
        );
    }
    if !report.is_consistent {
        return Err(anyhow::anyhow!(
            "Index has {} consistency issues",
            report.total_issues()
        ));
    }
    Ok(())
}

/// Show configuration, Ollama connectivity and index statistics
#[inline]
pub fn show_status(config: &Config) -> Result<()> {
    println!("📊 Docs-RAG Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Ollama Status:");
    match OllamaClient::new(&config.ollama) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("   📋 Embedding model: {}", config.ollama.embedding_model);
                println!("   💬 Generation model: {}", config.ollama.generation_model);
            }
            Err(e) => {
                println!("   ⚠️  Ollama: Connected but unhealthy - {:#}", e);
            }
        },
        Err(e) => {
            println!("   ❌ Ollama: Failed to connect - {:#}", e);
        }
    }
    println!();

    println!("🔍 Index Status:");
    println!("   📁 Location: {}", config.index_dir_path().display());
    println!("   🔢 Dimension: {}", config.embedding_dimension());
    match crate::index::RecordStore::open(config).and_then(|store| store.load()) {
        Ok(snapshot) => {
            println!("   ✅ Records: {}", snapshot.len());
            println!("   📄 Documents: {}", snapshot.documents().len());
        }
        Err(e) => {
            warn!("Failed to load index: {}", e);
            println!("   ❌ Index: {}", e);
        }
    }
    println!();

    println!("⚙️  Retrieval:");
    println!(
        "   Chunk size {} with overlap {}",
        config.chunking.chunk_size, config.chunking.overlap
    );
    println!(
        "   Top {} chunks, relevance threshold {:.2}",
        config.retrieval.top_k, config.retrieval.relevance_threshold
    );
    Ok(())
}
