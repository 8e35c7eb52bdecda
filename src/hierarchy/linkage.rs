//! SciPy-compatible linkage matrix.
//!
//! Row `i` is `(child_a, child_b, distance, size)`. Child indices below `n`
//! are original leaves; an index `c >= n` refers to row `c - n`, the cluster
//! formed by an earlier merge. Rows are in merge order.

use ndarray::Array2;

use super::Dendrogram;
use crate::error::{Error, Result};

/// One merge step of a [`LinkageMatrix`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkageRow {
    /// First child (leaf or earlier row).
    pub child_a: usize,
    /// Second child (leaf or earlier row).
    pub child_b: usize,
    /// Merge distance.
    pub distance: f64,
    /// Number of leaves under this merge.
    pub size: usize,
}

/// Linkage matrix over `n_leaves` leaves.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkageMatrix {
    n_leaves: usize,
    rows: Vec<LinkageRow>,
}

impl LinkageMatrix {
    /// Build the matrix from `(child_a, child_b, distance)` merges, computing
    /// each subtree size from its children.
    pub fn from_merges<I>(n_leaves: usize, merges: I) -> Result<Self>
    where
        I: IntoIterator<Item = (usize, usize, f64)>,
    {
        let mut rows: Vec<LinkageRow> = Vec::with_capacity(n_leaves.saturating_sub(1));
        for (i, (child_a, child_b, distance)) in merges.into_iter().enumerate() {
            let size_of = |child: usize| -> Result<usize> {
                if child < n_leaves {
                    return Ok(1);
                }
                rows.get(child - n_leaves).map(|r| r.size).ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "merge {i} references cluster {child} before it is formed"
                    ))
                })
            };
            let size = size_of(child_a)? + size_of(child_b)?;
            rows.push(LinkageRow {
                child_a,
                child_b,
                distance,
                size,
            });
        }
        if rows.len() + 1 != n_leaves {
            return Err(Error::DimensionMismatch {
                expected: n_leaves.saturating_sub(1),
                found: rows.len(),
            });
        }
        Ok(Self { n_leaves, rows })
    }

    /// Build the matrix from a complete dendrogram.
    pub fn from_dendrogram(dendro: &Dendrogram) -> Result<Self> {
        Self::from_merges(
            dendro.n_items(),
            dendro
                .merges()
                .map(|m| (m.cluster_a, m.cluster_b, m.distance)),
        )
    }

    /// Number of leaves.
    pub fn n_leaves(&self) -> usize {
        self.n_leaves
    }

    /// Number of rows (`n_leaves - 1`).
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the matrix has no rows (a single leaf).
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows in merge order.
    pub fn rows(&self) -> &[LinkageRow] {
        &self.rows
    }

    /// Dense `(n - 1) × 4` float matrix, as SciPy stores it.
    pub fn to_array(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.rows.len(), 4), |(i, j)| {
            let row = &self.rows[i];
            match j {
                0 => row.child_a as f64,
                1 => row.child_b as f64,
                2 => row.distance,
                _ => row.size as f64,
            }
        })
    }
}
