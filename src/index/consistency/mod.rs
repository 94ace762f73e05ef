// Index consistency validation
// Audits a loaded snapshot for the alignment the manager is meant to keep


use std::collections::HashSet;

use itertools::Itertools;
use tracing::{debug, info, warn};

use crate::Result;
use crate::embeddings::Embedder;
use crate::index::{IndexSnapshot, dot, normalize};

/// Largest allowed distance from 1.0 for norms and re-embedding similarity
pub const TOLERANCE: f32 = 1e-3;

/// Findings of one validation pass
#[derive(Debug, Clone, PartialEq)]
pub struct ConsistencyReport {
    /// Number of metadata records
    pub records: usize,
    /// Number of rows in the embedding matrix
    pub embedding_rows: usize,
    /// Number of slots in the similarity index
    pub index_rows: usize,
    /// Positions where the index row differs from the embedding row
    pub misaligned_rows: Vec<usize>,
    /// Positions whose embedding is not unit length
    pub non_unit_rows: Vec<usize>,
    /// Chunk ids that appear more than once. Informational only: ids are
    /// taken from the record count, so they can repeat after a removal.
    pub duplicate_chunk_ids: Vec<u64>,
    /// Positions whose text is empty after trimming
    pub empty_texts: Vec<usize>,
    /// Positions whose re-embedded text no longer matches the stored row
    pub reembedding_mismatches: Vec<usize>,
    /// Lowest similarity seen while re-embedding, if that check ran
    pub min_reembed_similarity: Option<f32>,
    /// Overall consistency status
    pub is_consistent: bool,
}

/// Checks an [`IndexSnapshot`] against the index invariants
pub struct ConsistencyValidator<'a> {
    snapshot: &'a IndexSnapshot,
}

impl<'a> ConsistencyValidator<'a> {
    #[inline]
    pub fn new(snapshot: &'a IndexSnapshot) -> Self {
        Self { snapshot }
    }

    /// Structural checks that need no model
    #[inline]
    pub fn validate(&self) -> ConsistencyReport {
        let report = self.structural_report();
        self.log_outcome(&report);
        report
    }

    fn structural_report(&self) -> ConsistencyReport {
        info!(
            "Validating index consistency over {} records",
            self.snapshot.len()
        );

        let snapshot = self.snapshot;
        let dimension = snapshot.dimension().max(1);
        let embedding_rows = snapshot.embeddings().len() / dimension;

        let mut misaligned_rows = Vec::new();
        let mut non_unit_rows = Vec::new();
        for position in 0..embedding_rows {
            let Some(row) = snapshot.embedding(position) else {
                continue;
            };
            if snapshot.index().row(position) != Some(row) {
                misaligned_rows.push(position);
            }
            if (dot(row, row).sqrt() - 1.0).abs() > TOLERANCE {
                non_unit_rows.push(position);
            }
        }

        let mut seen = HashSet::new();
        let duplicate_chunk_ids: Vec<u64> = snapshot
            .metadata()
            .iter()
            .filter(|record| !seen.insert(record.chunk_id))
            .map(|record| record.chunk_id)
            .unique()
            .collect();

        let empty_texts = snapshot
            .metadata()
            .iter()
            .enumerate()
            .filter(|(_, record)| record.text.trim().is_empty())
            .map(|(position, _)| position)
            .collect();

        let mut report = ConsistencyReport {
            records: snapshot.len(),
            embedding_rows,
            index_rows: snapshot.index().len(),
            misaligned_rows,
            non_unit_rows,
            duplicate_chunk_ids,
            empty_texts,
            reembedding_mismatches: Vec::new(),
            min_reembed_similarity: None,
            is_consistent: false,
        };
        report.is_consistent = report.total_issues() == 0;
        report
    }

    /// Structural checks plus re-embedding every chunk text and comparing
    /// it with the stored row. A stored row should score ~1.0 against a
    /// fresh embedding of its own text.
    #[inline]
    pub fn validate_with_reembedding(&self, embedder: &dyn Embedder) -> Result<ConsistencyReport> {
        let mut report = self.structural_report();
        if self.snapshot.is_empty() {
            self.log_outcome(&report);
            return Ok(report);
        }

        let texts: Vec<String> = self
            .snapshot
            .metadata()
            .iter()
            .map(|record| record.text.clone())
            .collect();
        let fresh = embedder.embed_batch(&texts)?;
        debug!("Re-embedded {} chunk texts", fresh.len());

        let mut min_similarity = f32::INFINITY;
        for (position, vector) in fresh.iter().enumerate() {
            let similarity = match (normalize(vector), self.snapshot.embedding(position)) {
                (Some(unit), Some(stored)) if unit.len() == stored.len() => dot(&unit, stored),
                _ => f32::NEG_INFINITY,
            };
            min_similarity = min_similarity.min(similarity);
            if (similarity - 1.0).abs() > TOLERANCE {
                report.reembedding_mismatches.push(position);
            }
        }
        if fresh.len() != texts.len() {
            report
                .reembedding_mismatches
                .extend(fresh.len()..texts.len());
        }

        report.min_reembed_similarity = Some(min_similarity);
        report.is_consistent = report.total_issues() == 0;
        self.log_outcome(&report);
        Ok(report)
    }

    fn log_outcome(&self, report: &ConsistencyReport) {
        if !report.duplicate_chunk_ids.is_empty() {
            debug!("Repeated chunk ids: {:?}", report.duplicate_chunk_ids);
        }
        if report.is_consistent {
            info!("Index consistency validation passed");
            return;
        }
        warn!("Index consistency validation found issues");
        if report.records != report.embedding_rows || report.records != report.index_rows {
            warn!(
                "Artifact lengths disagree: {} records, {} embedding rows, {} index rows",
                report.records, report.embedding_rows, report.index_rows
            );
        }
        if !report.misaligned_rows.is_empty() {
            warn!(
                "{} index rows differ from their embeddings",
                report.misaligned_rows.len()
            );
        }
        if !report.non_unit_rows.is_empty() {
            warn!("{} embeddings are not unit length", report.non_unit_rows.len());
        }
        if !report.empty_texts.is_empty() {
            warn!("{} records have empty text", report.empty_texts.len());
        }
        if !report.reembedding_mismatches.is_empty() {
            warn!(
                "{} chunks no longer match their re-embedded text",
                report.reembedding_mismatches.len()
            );
        }
    }
}

impl ConsistencyReport {
    /// Get a human-readable summary of the consistency report
    #[inline]
    pub fn summary(&self) -> String {
        if self.is_consistent {
            format!(
                "Index is consistent: {} records, {} embedding rows, {} index rows",
                self.records, self.embedding_rows, self.index_rows
            )
        } else {
            format!(
                "Index inconsistencies found: {} misaligned rows, {} non-unit embeddings, {} empty texts, {} re-embedding mismatches",
                self.misaligned_rows.len(),
                self.non_unit_rows.len(),
                self.empty_texts.len(),
                self.reembedding_mismatches.len()
            )
        }
    }

    /// Get the total number of consistency issues
    #[inline]
    pub fn total_issues(&self) -> usize {
        let length_issues = usize::from(self.records != self.embedding_rows)
            + usize::from(self.records != self.index_rows);
        length_issues
            + self.misaligned_rows.len()
            + self.non_unit_rows.len()
            + self.empty_texts.len()
            + self.reembedding_mismatches.len()
    }
}
