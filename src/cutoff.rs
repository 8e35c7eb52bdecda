//! Cutoff selection: the distance at which the merge tree is cut.
//!
//! A [`CutoffSpec`] is either a pinned number or the name of a
//! model-selection criterion. Criterion search walks an ascending grid of
//! candidate cutoffs, cuts the tree at each, and keeps the candidate with
//! the lowest penalized score:
//!
//! ```text
//! AIC = S / σ² + 2 · M · k
//! BIC = S / σ² + N · k · ln(M)
//! ```
//!
//! where `S` is the within-cluster sum of squared deviations from the
//! cluster centroids, `σ` the median per-channel standard deviation of the
//! whole dataset, `N` samples, `M` channels and `k` clusters.
//!
//! Ties go to the lowest cutoff.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, Axis};
use tracing::{debug, info};

use crate::cluster::{HierarchicalModel, RawClusterLabels};
use crate::error::{Error, Result};
use crate::metric::DistanceMatrix;

/// Default number of grid points for criterion search.
pub const DEFAULT_N_STEPS: usize = 100;

/// Default pinned cutoff.
pub const DEFAULT_CUTOFF: f64 = 0.7;

/// Configured cutoff: a pinned value or a criterion keyword.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum CutoffSpec {
    /// Use this distance as-is.
    Fixed(f64),
    /// Minimize the Akaike information criterion over the grid.
    Aic,
    /// Minimize the Bayesian information criterion over the grid.
    Bic,
}

impl Default for CutoffSpec {
    fn default() -> Self {
        CutoffSpec::Fixed(DEFAULT_CUTOFF)
    }
}

impl CutoffSpec {
    /// Criterion keywords accepted by [`FromStr`]; anything else must be a
    /// non-negative number.
    pub fn keys() -> Vec<&'static str> {
        vec!["aic", "bic"]
    }

    /// Pinned cutoff, checked to be a finite non-negative number.
    pub fn fixed(value: f64) -> Result<Self> {
        if !value.is_finite() || value < 0.0 {
            return Err(Error::config(
                "cutoff",
                format!("cutoff must be a non-negative number, got {value}"),
            ));
        }
        Ok(CutoffSpec::Fixed(value))
    }

    /// Check a spec built directly from its variants.
    pub fn validate(&self) -> Result<()> {
        match *self {
            CutoffSpec::Fixed(value) => Self::fixed(value).map(|_| ()),
            CutoffSpec::Aic | CutoffSpec::Bic => Ok(()),
        }
    }

    /// Fresh optimizer for this spec.
    pub fn optimizer(&self) -> Box<dyn CutoffOptimizer> {
        match *self {
            CutoffSpec::Fixed(value) => Box::new(FixedCutoff::new(value)),
            CutoffSpec::Aic => Box::new(CriterionSearch::new(Criterion::Aic)),
            CutoffSpec::Bic => Box::new(CriterionSearch::new(Criterion::Bic)),
        }
    }
}

impl fmt::Display for CutoffSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CutoffSpec::Fixed(v) => write!(f, "{v}"),
            CutoffSpec::Aic => f.write_str("aic"),
            CutoffSpec::Bic => f.write_str("bic"),
        }
    }
}

impl FromStr for CutoffSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "aic" => Ok(CutoffSpec::Aic),
            "bic" => Ok(CutoffSpec::Bic),
            other => {
                let value: f64 = other.parse().map_err(|_| {
                    Error::config(
                        "cutoff",
                        format!(
                            "expected one of {:?} or a non-negative number, got '{other}'",
                            Self::keys()
                        ),
                    )
                })?;
                Self::fixed(value)
            }
        }
    }
}

/// Inputs a cutoff optimizer may look at.
#[derive(Debug, Clone, Copy)]
pub struct OptimizeContext<'a> {
    /// Fitted merge tree.
    pub model: &'a HierarchicalModel,
    /// Intensity matrix the tree was built from.
    pub intens: &'a Array2<f64>,
    /// Ascending candidate cutoffs.
    pub candidates: &'a [f64],
}

/// Strategy choosing the final cutoff of a run.
pub trait CutoffOptimizer: fmt::Debug + Send {
    /// Choose and store the final cutoff.
    fn optimize(&mut self, ctx: &OptimizeContext<'_>) -> Result<f64>;

    /// Final cutoff, once [`optimize`](Self::optimize) has run.
    fn cutoff_final(&self) -> Option<f64>;

    /// Human-readable final cutoff, e.g. `0.70` or `1.25(AIC)`.
    fn describe(&self) -> Option<String>;
}

/// Pinned cutoff. Ignores the candidate grid.
#[derive(Debug, Clone)]
pub struct FixedCutoff {
    pinned: f64,
    cutoff_final: Option<f64>,
}

impl FixedCutoff {
    /// Pin `value` as the cutoff.
    pub fn new(value: f64) -> Self {
        Self {
            pinned: value,
            cutoff_final: None,
        }
    }
}

impl CutoffOptimizer for FixedCutoff {
    fn optimize(&mut self, _ctx: &OptimizeContext<'_>) -> Result<f64> {
        self.cutoff_final = Some(self.pinned);
        Ok(self.pinned)
    }

    fn cutoff_final(&self) -> Option<f64> {
        self.cutoff_final
    }

    fn describe(&self) -> Option<String> {
        self.cutoff_final.map(|c| format!("{c:.2}"))
    }
}

/// Penalized-likelihood criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criterion {
    /// Penalty `2 · M · k`.
    Aic,
    /// Penalty `N · k · ln(M)`.
    Bic,
}

impl Criterion {
    /// Score of a clustering with `k` clusters and scaled scatter
    /// `scaled_scatter`, over `n` samples and `m` channels.
    pub fn score(&self, scaled_scatter: f64, n: usize, m: usize, k: usize) -> f64 {
        let penalty = match self {
            Criterion::Aic => 2.0 * m as f64 * k as f64,
            Criterion::Bic => n as f64 * k as f64 * (m as f64).ln(),
        };
        scaled_scatter + penalty
    }

    fn tag(&self) -> &'static str {
        match self {
            Criterion::Aic => "AIC",
            Criterion::Bic => "BIC",
        }
    }
}

/// Grid search minimizing a [`Criterion`].
#[derive(Debug, Clone)]
pub struct CriterionSearch {
    criterion: Criterion,
    cutoff_final: Option<f64>,
    scores: Vec<f64>,
}

impl CriterionSearch {
    /// New search for `criterion`.
    pub fn new(criterion: Criterion) -> Self {
        Self {
            criterion,
            cutoff_final: None,
            scores: Vec::new(),
        }
    }

    /// Score of every candidate from the last search, in grid order.
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    fn evaluate(&self, labels: &RawClusterLabels, intens: &Array2<f64>, sigma: f64) -> Result<f64> {
        let (n, m) = intens.dim();
        let scaled = scale_scatter(within_cluster_scatter(intens, labels)?, sigma);
        Ok(self.criterion.score(scaled, n, m, labels.n_clusters()))
    }
}

impl CutoffOptimizer for CriterionSearch {
    fn optimize(&mut self, ctx: &OptimizeContext<'_>) -> Result<f64> {
        if ctx.candidates.is_empty() {
            return Err(Error::InvalidInput("empty cutoff candidate list".into()));
        }
        if ctx.intens.nrows() != ctx.model.n_samples() {
            return Err(Error::DimensionMismatch {
                expected: ctx.model.n_samples(),
                found: ctx.intens.nrows(),
            });
        }
        let sigma = noise_sigma(ctx.intens);

        // Each candidate gets a fresh cut of the immutable tree.
        self.scores = ctx
            .candidates
            .iter()
            .map(|&cutoff| {
                let labels = ctx.model.cut(cutoff);
                let score = self.evaluate(&labels, ctx.intens, sigma)?;
                debug!(
                    cutoff,
                    n_clusters = labels.n_clusters(),
                    score,
                    criterion = self.criterion.tag(),
                    "scored cutoff candidate"
                );
                Ok(score)
            })
            .collect::<Result<Vec<f64>>>()?;

        let mut best = 0;
        let mut best_score = f64::INFINITY;
        for (i, &score) in self.scores.iter().enumerate() {
            if score < best_score {
                best = i;
                best_score = score;
            }
        }
        let cutoff = ctx.candidates[best];
        info!(
            cutoff,
            score = best_score,
            sigma,
            criterion = self.criterion.tag(),
            "selected cutoff"
        );
        self.cutoff_final = Some(cutoff);
        Ok(cutoff)
    }

    fn cutoff_final(&self) -> Option<f64> {
        self.cutoff_final
    }

    fn describe(&self) -> Option<String> {
        self.cutoff_final
            .map(|c| format!("{c:.2}({})", self.criterion.tag()))
    }
}

/// `n_steps` evenly spaced cutoffs from the smallest to the largest entry of
/// `dist`, both ends included.
pub fn cutoff_grid(dist: &DistanceMatrix, n_steps: usize) -> Result<Vec<f64>> {
    if n_steps == 0 {
        return Err(Error::config("n_cutoff_steps", "must be at least 1"));
    }
    let (lo, hi) = (dist.min(), dist.max());
    if n_steps == 1 {
        return Ok(vec![lo]);
    }
    let step = (hi - lo) / (n_steps - 1) as f64;
    let mut grid: Vec<f64> = (0..n_steps).map(|i| lo + i as f64 * step).collect();
    grid[n_steps - 1] = hi;
    Ok(grid)
}

/// Median over channels of the population standard deviation across samples.
pub fn noise_sigma(intens: &Array2<f64>) -> f64 {
    let mut stds: Vec<f64> = intens.std_axis(Axis(0), 0.0).to_vec();
    if stds.is_empty() {
        return 0.0;
    }
    stds.sort_by(|a, b| a.total_cmp(b));
    let mid = stds.len() / 2;
    if stds.len() % 2 == 0 {
        (stds[mid - 1] + stds[mid]) / 2.0
    } else {
        stds[mid]
    }
}

/// Sum over clusters of squared deviations from the cluster centroid.
///
/// `labels` must hold one label per row of `intens`.
pub fn within_cluster_scatter(intens: &Array2<f64>, labels: &RawClusterLabels) -> Result<f64> {
    if labels.len() != intens.nrows() {
        return Err(Error::DimensionMismatch {
            expected: intens.nrows(),
            found: labels.len(),
        });
    }
    let m = intens.ncols();
    let k = labels.n_clusters();
    let mut sums = Array2::<f64>::zeros((k, m));
    let sizes = labels.sizes();
    for (row, &l) in intens.outer_iter().zip(labels.labels()) {
        let mut acc = sums.row_mut(l);
        acc += &row;
    }
    for (mut centroid, &size) in sums.outer_iter_mut().zip(&sizes) {
        if size > 0 {
            centroid /= size as f64;
        }
    }
    Ok(intens
        .outer_iter()
        .zip(labels.labels())
        .map(|(row, &l)| {
            row.iter()
                .zip(sums.row(l).iter())
                .map(|(x, c)| (x - c).powi(2))
                .sum::<f64>()
        })
        .sum())
}

/// `scatter / σ²`; a zero σ maps zero scatter to 0 and anything else to +∞.
fn scale_scatter(scatter: f64, sigma: f64) -> f64 {
    if sigma > 0.0 {
        scatter / (sigma * sigma)
    } else if scatter == 0.0 {
        0.0
    } else {
        f64::INFINITY
    }
}
