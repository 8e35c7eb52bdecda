//! Pairwise distance metrics over spectral intensity matrices.
//!
//! A [`Metric`] maps an `N × M` intensity matrix (one spectrum per row) to an
//! `N × N` [`DistanceMatrix`]. Metrics are selected by key:
//!
//! | Key | Definition |
//! |-----|------------|
//! | `euclidean` (default) | √Σ(a−b)² |
//! | `sqeuclidean` | Σ(a−b)² |
//! | `cityblock` | Σ\|a−b\| |
//! | `cosine` | 1 − a·b / (‖a‖‖b‖) |
//! | `correlation` | cosine distance of the mean-centred rows |
//!
//! ```rust
//! use ndarray::array;
//! use opu_hca::Metric;
//!
//! let intens = array![[0.0, 0.0], [3.0, 4.0]];
//! let metric: Metric = "euclidean".parse().unwrap();
//! let dist = metric.compute(&intens).unwrap();
//! assert_eq!(dist.get(0, 1), 5.0);
//! ```

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, ArrayView1};

use crate::error::{Error, Result};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Registered distance metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Metric {
    /// L2 distance.
    #[default]
    Euclidean,
    /// Squared L2 distance.
    SqEuclidean,
    /// L1 (Manhattan) distance.
    Cityblock,
    /// One minus cosine similarity.
    Cosine,
    /// One minus Pearson correlation.
    Correlation,
}

impl Metric {
    /// All registered metrics, in key order.
    pub const ALL: [Metric; 5] = [
        Metric::Cityblock,
        Metric::Correlation,
        Metric::Cosine,
        Metric::Euclidean,
        Metric::SqEuclidean,
    ];

    /// Registry keys accepted by [`FromStr`], sorted.
    pub fn keys() -> Vec<&'static str> {
        Self::ALL.iter().map(|m| m.key()).collect()
    }

    /// Registry key of this metric.
    pub fn key(&self) -> &'static str {
        match self {
            Metric::Euclidean => "euclidean",
            Metric::SqEuclidean => "sqeuclidean",
            Metric::Cityblock => "cityblock",
            Metric::Cosine => "cosine",
            Metric::Correlation => "correlation",
        }
    }

    /// Human-readable name, used for colorbar labels and run summaries.
    pub fn display_name(&self) -> &'static str {
        match self {
            Metric::Euclidean => "Euclidean distance",
            Metric::SqEuclidean => "squared Euclidean distance",
            Metric::Cityblock => "Manhattan distance",
            Metric::Cosine => "cosine distance",
            Metric::Correlation => "correlation distance",
        }
    }

    /// Distance between two spectra.
    pub fn pair(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        let d = match self {
            Metric::Euclidean => sq_euclidean(a, b).sqrt(),
            Metric::SqEuclidean => sq_euclidean(a, b),
            Metric::Cityblock => a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum(),
            Metric::Cosine => cosine_distance(a.iter().copied(), b.iter().copied()),
            Metric::Correlation => {
                let ma = a.mean().unwrap_or(0.0);
                let mb = b.mean().unwrap_or(0.0);
                cosine_distance(a.iter().map(|x| x - ma), b.iter().map(|y| y - mb))
            }
        };
        d.max(0.0)
    }

    /// Compute the full pairwise distance matrix of the rows of `intens`.
    pub fn compute(&self, intens: &Array2<f64>) -> Result<DistanceMatrix> {
        validate_intensity(intens)?;
        let n = intens.nrows();

        #[cfg(feature = "parallel")]
        let upper: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| {
                ((i + 1)..n)
                    .map(|j| self.pair(intens.row(i), intens.row(j)))
                    .collect()
            })
            .collect();

        #[cfg(not(feature = "parallel"))]
        let upper: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                ((i + 1)..n)
                    .map(|j| self.pair(intens.row(i), intens.row(j)))
                    .collect()
            })
            .collect();

        let mut data = Array2::zeros((n, n));
        for (i, row) in upper.iter().enumerate() {
            for (offset, &d) in row.iter().enumerate() {
                let j = i + 1 + offset;
                data[[i, j]] = d;
                data[[j, i]] = d;
            }
        }
        Ok(DistanceMatrix { data })
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.key() == s)
            .ok_or_else(|| {
                Error::config(
                    "metric",
                    format!("unknown metric '{s}'; expected one of {:?}", Self::keys()),
                )
            })
    }
}

#[inline]
fn sq_euclidean(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

fn cosine_distance(a: impl Iterator<Item = f64>, b: impl Iterator<Item = f64>) -> f64 {
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    match (norm_a == 0.0, norm_b == 0.0) {
        (true, true) => 0.0,
        (true, false) | (false, true) => 1.0,
        _ => 1.0 - dot / (norm_a.sqrt() * norm_b.sqrt()),
    }
}

/// Check that an intensity matrix has at least two samples, one channel, and
/// only finite values.
pub fn validate_intensity(intens: &Array2<f64>) -> Result<()> {
    if intens.is_empty() {
        return Err(Error::EmptyInput);
    }
    if intens.nrows() < 2 {
        return Err(Error::InvalidInput(format!(
            "need at least 2 samples, got {}",
            intens.nrows()
        )));
    }
    if let Some(((i, j), v)) = intens.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(Error::InvalidInput(format!(
            "non-finite intensity {v} at sample {i}, channel {j}"
        )));
    }
    Ok(())
}

/// Symmetric pairwise distance matrix with a zero diagonal.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    data: Array2<f64>,
}

impl DistanceMatrix {
    /// Wrap a precomputed square matrix after checking it is a valid
    /// distance matrix.
    pub fn from_array(data: Array2<f64>) -> Result<Self> {
        let (n, m) = data.dim();
        if n != m {
            return Err(Error::DimensionMismatch {
                expected: n,
                found: m,
            });
        }
        if n < 2 {
            return Err(Error::InvalidInput(format!(
                "need at least 2 samples, got {n}"
            )));
        }
        for i in 0..n {
            if data[[i, i]] != 0.0 {
                return Err(Error::InvalidInput(format!(
                    "non-zero diagonal at {i}: {}",
                    data[[i, i]]
                )));
            }
            for j in (i + 1)..n {
                let d = data[[i, j]];
                if !d.is_finite() || d < 0.0 || d != data[[j, i]] {
                    return Err(Error::InvalidInput(format!(
                        "entry ({i}, {j}) is not a symmetric non-negative distance"
                    )));
                }
            }
        }
        Ok(Self { data })
    }

    /// Number of samples.
    pub fn n(&self) -> usize {
        self.data.nrows()
    }

    /// Distance between samples `i` and `j`.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[[i, j]]
    }

    /// Dense view of the matrix.
    pub fn as_array(&self) -> &Array2<f64> {
        &self.data
    }

    /// Upper triangle in row-major order, length `n * (n - 1) / 2`.
    pub fn condensed(&self) -> Vec<f64> {
        let n = self.n();
        let mut out = Vec::with_capacity(n * (n - 1) / 2);
        for i in 0..n {
            for j in (i + 1)..n {
                out.push(self.data[[i, j]]);
            }
        }
        out
    }

    /// Smallest entry, diagonal included.
    pub fn min(&self) -> f64 {
        self.data.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// Largest entry.
    pub fn max(&self) -> f64 {
        self.data.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Matrix with rows and columns permuted into `order` (e.g. dendrogram
    /// leaf order, for heatmaps). `order` must be a permutation of `0..n`.
    pub fn reordered(&self, order: &[usize]) -> Result<Array2<f64>> {
        let n = self.n();
        if order.len() != n {
            return Err(Error::DimensionMismatch {
                expected: n,
                found: order.len(),
            });
        }
        let mut used = vec![false; n];
        for &i in order {
            if i >= n {
                return Err(Error::InvalidInput(format!("order index {i} out of range")));
            }
            if std::mem::replace(&mut used[i], true) {
                return Err(Error::InvalidInput(format!(
                    "order index {i} appears more than once"
                )));
            }
        }
        Ok(Array2::from_shape_fn((n, n), |(i, j)| {
            self.data[[order[i], order[j]]]
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use proptest::prelude::*;

    #[test]
    fn test_euclidean_basic() {
        let intens = array![[0.0, 0.0], [3.0, 4.0], [6.0, 8.0]];
        let d = Metric::Euclidean.compute(&intens).unwrap();
        assert_eq!(d.get(0, 1), 5.0);
        assert_eq!(d.get(0, 2), 10.0);
        assert_eq!(d.get(2, 1), 5.0);
        assert_eq!(d.condensed(), vec![5.0, 10.0, 5.0]);
    }

    #[test]
    fn test_other_metrics() {
        let intens = array![[1.0, 0.0], [0.0, 1.0], [2.0, 0.0]];
        let sq = Metric::SqEuclidean.compute(&intens).unwrap();
        assert_eq!(sq.get(0, 1), 2.0);
        let l1 = Metric::Cityblock.compute(&intens).unwrap();
        assert_eq!(l1.get(1, 2), 3.0);
        let cos = Metric::Cosine.compute(&intens).unwrap();
        assert!((cos.get(0, 1) - 1.0).abs() < 1e-12);
        assert!(cos.get(0, 2).abs() < 1e-12);
    }

    #[test]
    fn test_correlation_ignores_offset() {
        let intens = array![[1.0, 2.0, 3.0], [11.0, 12.0, 13.0], [3.0, 2.0, 1.0]];
        let d = Metric::Correlation.compute(&intens).unwrap();
        assert!(d.get(0, 1).abs() < 1e-12);
        assert!((d.get(0, 2) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_vectors_do_not_produce_nan() {
        let intens = array![[0.0, 0.0], [0.0, 0.0], [1.0, 1.0]];
        let d = Metric::Cosine.compute(&intens).unwrap();
        assert_eq!(d.get(0, 1), 0.0);
        assert_eq!(d.get(0, 2), 1.0);
    }

    #[test]
    fn test_registry_keys() {
        assert_eq!(Metric::default(), Metric::Euclidean);
        assert_eq!("cosine".parse::<Metric>().unwrap(), Metric::Cosine);
        let err = "chebyshev".parse::<Metric>().unwrap_err();
        assert!(matches!(err, Error::Configuration { name: "metric", .. }));
        let keys = Metric::keys();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_rejects_bad_input() {
        let one = array![[1.0, 2.0]];
        assert!(matches!(
            Metric::Euclidean.compute(&one),
            Err(Error::InvalidInput(_))
        ));
        let nan = array![[1.0, f64::NAN], [0.0, 0.0]];
        assert!(Metric::Euclidean.compute(&nan).is_err());
        let empty = Array2::<f64>::zeros((0, 3));
        assert!(matches!(
            Metric::Euclidean.compute(&empty),
            Err(Error::EmptyInput)
        ));
    }

    #[test]
    fn test_from_array_validation() {
        assert!(DistanceMatrix::from_array(array![[0.0, 1.0], [1.0, 0.0]]).is_ok());
        assert!(DistanceMatrix::from_array(array![[0.0, 1.0], [2.0, 0.0]]).is_err());
        assert!(DistanceMatrix::from_array(array![[1.0, 1.0], [1.0, 0.0]]).is_err());
        assert!(DistanceMatrix::from_array(array![[0.0, -1.0], [-1.0, 0.0]]).is_err());
    }

    #[test]
    fn test_reordered() {
        let d = DistanceMatrix::from_array(array![
            [0.0, 1.0, 2.0],
            [1.0, 0.0, 3.0],
            [2.0, 3.0, 0.0]
        ])
        .unwrap();
        let r = d.reordered(&[2, 0, 1]).unwrap();
        assert_eq!(r[[0, 1]], 2.0);
        assert_eq!(r[[0, 2]], 3.0);
        assert_eq!(r[[1, 2]], 1.0);
        assert!(d.reordered(&[0, 1]).is_err());
        assert!(matches!(d.reordered(&[0, 3, 1]), Err(Error::InvalidInput(_))));
        assert!(matches!(d.reordered(&[0, 0, 1]), Err(Error::InvalidInput(_))));
    }

    fn intensity_strategy() -> impl Strategy<Value = Array2<f64>> {
        (2usize..8, 1usize..6).prop_flat_map(|(n, m)| {
            proptest::collection::vec(-100.0f64..100.0, n * m)
                .prop_map(move |v| Array2::from_shape_vec((n, m), v).unwrap())
        })
    }

    proptest! {
        #[test]
        fn distance_matrix_is_symmetric_nonnegative(intens in intensity_strategy()) {
            for metric in Metric::ALL {
                let d = metric.compute(&intens).unwrap();
                let n = d.n();
                for i in 0..n {
                    prop_assert_eq!(d.get(i, i), 0.0);
                    for j in 0..n {
                        prop_assert!(d.get(i, j) >= 0.0);
                        prop_assert_eq!(d.get(i, j), d.get(j, i));
                    }
                }
            }
        }
    }
}
