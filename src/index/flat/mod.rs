
use std::cmp::Ordering;

use crate::index::dot;
use crate::{DocsError, Result};

/// Label reported for result slots that hold no record
pub const EMPTY_SLOT: i64 = -1;

/// Most empty slots a search pads its output with
pub const MAX_EMPTY_SLOTS: usize = 1024;

/// Exact nearest-neighbour index scored by inner product.
///
/// Vectors are stored row-major in insertion order; slot `i` is row `i`.
/// There is no deletion: removing vectors means building a new index from
/// the rows that remain.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<f32>,
}

/// Search output, padded toward the requested `k`.
///
/// Slots past the number of stored vectors carry [`EMPTY_SLOT`] as their
/// label and negative infinity as their score. At most [`MAX_EMPTY_SLOTS`]
/// such slots are added, so the output never grows with an oversized `k`.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbors {
    pub scores: Vec<f32>,
    pub labels: Vec<i64>,
}

impl Neighbors {
    /// Iterate over `(position, score)` pairs, skipping empty slots
    #[inline]
    pub fn valid(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.labels
            .iter()
            .zip(self.scores.iter())
            .filter_map(|(&label, &score)| usize::try_from(label).ok().map(|pos| (pos, score)))
    }
}

impl FlatIndex {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }

    /// Build an index over an existing row-major matrix
    #[inline]
    pub fn from_vectors(dimension: usize, vectors: Vec<f32>) -> Result<Self> {
        let mut index = Self::new(dimension);
        index.add(&vectors)?;
        Ok(index)
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            return 0;
        }
        self.vectors.len() / self.dimension
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Row-major storage of every vector in the index
    #[inline]
    pub fn vectors(&self) -> &[f32] {
        &self.vectors
    }

    #[inline]
    pub fn row(&self, position: usize) -> Option<&[f32]> {
        self.vectors
            .get(position * self.dimension..(position + 1) * self.dimension)
    }

    /// Append one or more rows. `rows.len()` must be a multiple of the
    /// index dimension.
    #[inline]
    pub fn add(&mut self, rows: &[f32]) -> Result<()> {
        if self.dimension == 0 {
            return Err(DocsError::Config(
                "index dimension must be greater than zero".to_string(),
            ));
        }
        if rows.len() % self.dimension != 0 {
            return Err(DocsError::DimensionMismatch {
                expected: self.dimension,
                found: rows.len() % self.dimension,
            });
        }
        self.vectors.extend_from_slice(rows);
        Ok(())
    }

    #[inline]
    pub fn reset(&mut self) {
        self.vectors.clear();
    }

    /// Score every stored vector against `query` and keep the best `k`.
    ///
    /// Results are ordered by descending score; equal scores keep
    /// insertion order, so the lower slot wins a tie.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Neighbors> {
        if query.len() != self.dimension {
            return Err(DocsError::DimensionMismatch {
                expected: self.dimension,
                found: query.len(),
            });
        }

        let mut ranked: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dimension.max(1))
            .map(|row| dot(query, row))
            .enumerate()
            .collect();

        let keep = k.min(ranked.len());
        if keep > 0 && keep < ranked.len() {
            ranked.select_nth_unstable_by(keep - 1, rank_order);
        }
        ranked.truncate(keep);
        ranked.sort_unstable_by(rank_order);

        let width = k.min(keep.saturating_add(MAX_EMPTY_SLOTS));
        let mut scores = Vec::with_capacity(width);
        let mut labels = Vec::with_capacity(width);
        for (position, score) in ranked {
            scores.push(score);
            labels.push(position as i64);
        }
        scores.resize(width, f32::NEG_INFINITY);
        labels.resize(width, EMPTY_SLOT);

        Ok(Neighbors { scores, labels })
    }
}

fn rank_order(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
}
