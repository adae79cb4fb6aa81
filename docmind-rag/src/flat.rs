//! Exhaustive inner-product similarity structure over unit vectors.
//!
//! [`FlatIndex`] stores vectors row-major in one `Vec<f32>` and scores a query
//! against every row. It has no removal operation; collections rebuild a fresh
//! structure from their retained embeddings instead.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Return `vector` scaled to unit Euclidean length.
///
/// # Errors
///
/// Returns [`RagError::InvalidVector`] for an empty vector, a vector of zero
/// magnitude, or one containing non-finite components.
pub fn normalize(vector: &[f32]) -> Result<Vec<f32>> {
    if vector.is_empty() {
        return Err(RagError::InvalidVector("vector is empty".to_string()));
    }
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(RagError::InvalidVector("vector contains non-finite values".to_string()));
    }
    // Accumulate in f64: squares of tiny or huge f32 components leave f32 range.
    let norm = vector.iter().map(|&x| f64::from(x) * f64::from(x)).sum::<f64>().sqrt();
    if norm == 0.0 {
        return Err(RagError::InvalidVector("vector has zero magnitude".to_string()));
    }
    Ok(vector.iter().map(|&x| (f64::from(x) / norm) as f32).collect())
}

/// Normalize every vector of a batch, checking all share `dimension`.
pub(crate) fn normalize_batch(vectors: &[Vec<f32>], dimension: usize) -> Result<Vec<Vec<f32>>> {
    vectors
        .iter()
        .map(|v| {
            if v.len() != dimension {
                return Err(RagError::DimensionMismatch { expected: dimension, actual: v.len() });
            }
            normalize(v)
        })
        .collect()
}

/// A flat, exhaustively searched inner-product index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Name reported in collection info.
    pub const KIND: &'static str = "FlatInnerProduct";

    /// Create an empty index of the given width.
    pub fn new(dimension: usize) -> Self {
        Self { dimension, data: Vec::new() }
    }

    /// Build an index from already normalized rows.
    pub fn from_rows(dimension: usize, rows: &[Vec<f32>]) -> Result<Self> {
        let mut index = Self::new(dimension);
        index.add(rows)?;
        Ok(index)
    }

    /// The declared width of every row.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        if self.dimension == 0 { 0 } else { self.data.len() / self.dimension }
    }

    /// Whether the index holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the flat buffer holds a whole number of rows.
    pub(crate) fn is_well_formed(&self) -> bool {
        self.dimension > 0 && self.data.len() % self.dimension == 0
    }

    /// Append rows. Every row must match the declared width.
    pub fn add(&mut self, rows: &[Vec<f32>]) -> Result<()> {
        if let Some(bad) = rows.iter().find(|r| r.len() != self.dimension) {
            return Err(RagError::DimensionMismatch { expected: self.dimension, actual: bad.len() });
        }
        self.data.reserve(rows.len() * self.dimension);
        for row in rows {
            self.data.extend_from_slice(row);
        }
        Ok(())
    }

    /// Keep only the first `rows` rows.
    pub(crate) fn truncate(&mut self, rows: usize) {
        self.data.truncate(rows * self.dimension);
    }

    /// Score `query` against every row and return the best `k` as
    /// `(row, score)` pairs.
    ///
    /// Results are ordered by descending score; equal scores keep insertion
    /// order (lowest row first).
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dimension)
            .map(|row| row.iter().zip(query).map(|(a, b)| a * b).sum::<f32>())
            .enumerate()
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }
}
