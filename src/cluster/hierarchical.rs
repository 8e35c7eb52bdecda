//! Hierarchical (agglomerative) clustering on a precomputed distance matrix.
//!
//! Bottom-up clustering that builds a **dendrogram** by iteratively
//! merging the closest clusters. The tree is fitted once; flat clusterings
//! are read off it by cutting at a distance.
//!
//! # Linkage Methods
//!
//! | Linkage | Formula | Effect |
//! |---------|---------|--------|
//! | Single | min(d(a,b)) for a∈A, b∈B | Chaining; elongated clusters |
//! | Complete | max(d(a,b)) | Compact, spherical clusters |
//! | Average | mean(d(a,b)) | Balanced compromise |
//! | Weighted | mean of the two merged clusters' distances | WPGMA |
//! | Ward | Δ variance | Minimizes within-cluster variance |
//! | Centroid | distance between centroids | May produce inversions |
//! | Median | distance between WPGMC medians | May produce inversions |

use std::fmt;
use std::str::FromStr;

use kodama::{linkage as kodama_linkage, Method as KodamaMethod};
use tracing::debug;

use super::RawClusterLabels;
use crate::error::{Error, Result};
use crate::hierarchy::{Dendrogram, DendrogramLayout, LinkageMatrix};
use crate::metric::DistanceMatrix;

/// Linkage method for hierarchical clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Linkage {
    /// Single linkage: minimum distance between clusters.
    Single,
    /// Complete linkage: maximum distance between clusters.
    Complete,
    /// Average linkage: mean distance between clusters.
    #[default]
    Average,
    /// Weighted average linkage (WPGMA).
    Weighted,
    /// Ward's method: minimize within-cluster variance.
    Ward,
    /// Centroid linkage (UPGMC).
    Centroid,
    /// Median linkage (WPGMC).
    Median,
}

impl Linkage {
    /// All linkage rules.
    pub const ALL: [Linkage; 7] = [
        Linkage::Average,
        Linkage::Centroid,
        Linkage::Complete,
        Linkage::Median,
        Linkage::Single,
        Linkage::Ward,
        Linkage::Weighted,
    ];

    /// Key accepted by [`FromStr`].
    pub fn key(&self) -> &'static str {
        match self {
            Linkage::Single => "single",
            Linkage::Complete => "complete",
            Linkage::Average => "average",
            Linkage::Weighted => "weighted",
            Linkage::Ward => "ward",
            Linkage::Centroid => "centroid",
            Linkage::Median => "median",
        }
    }

    fn method(&self) -> KodamaMethod {
        match self {
            Linkage::Single => KodamaMethod::Single,
            Linkage::Complete => KodamaMethod::Complete,
            Linkage::Average => KodamaMethod::Average,
            Linkage::Weighted => KodamaMethod::Weighted,
            Linkage::Ward => KodamaMethod::Ward,
            Linkage::Centroid => KodamaMethod::Centroid,
            Linkage::Median => KodamaMethod::Median,
        }
    }
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Linkage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|l| l.key() == s)
            .ok_or_else(|| {
                let keys: Vec<_> = Self::ALL.iter().map(|l| l.key()).collect();
                Error::config(
                    "linkage",
                    format!("unknown linkage '{s}'; expected one of {keys:?}"),
                )
            })
    }
}

/// Hierarchical (agglomerative) clustering.
#[derive(Debug, Clone, Default)]
pub struct HierarchicalClustering {
    /// Linkage method.
    linkage: Linkage,
}

impl HierarchicalClustering {
    /// Create a new hierarchical clusterer with average linkage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set linkage method.
    pub fn with_linkage(mut self, linkage: Linkage) -> Self {
        self.linkage = linkage;
        self
    }

    /// Fit the full merge tree over a precomputed distance matrix.
    pub fn fit(&self, dist: &DistanceMatrix) -> Result<HierarchicalModel> {
        let n = dist.n();
        let mut condensed = dist.condensed();

        // kodama uses SciPy-style cluster labels:
        // - leaves: 0..n-1
        // - each merge i creates cluster id n+i
        let dend = kodama_linkage(&mut condensed, n, self.linkage.method());

        let mut dendrogram = Dendrogram::new(n);
        for step in dend.steps() {
            dendrogram.add_merge(step.cluster1, step.cluster2, step.dissimilarity)?;
        }
        if !dendrogram.is_monotonic() {
            debug!(linkage = %self.linkage, "merge distances are not monotonic");
        }

        Ok(HierarchicalModel {
            linkage: self.linkage,
            dendrogram,
        })
    }
}

/// A fitted merge tree. Immutable: every cut produces fresh labels.
#[derive(Debug, Clone, PartialEq)]
pub struct HierarchicalModel {
    linkage: Linkage,
    dendrogram: Dendrogram,
}

impl HierarchicalModel {
    /// Linkage rule used for the fit.
    pub fn linkage(&self) -> Linkage {
        self.linkage
    }

    /// Underlying merge history.
    pub fn dendrogram(&self) -> &Dendrogram {
        &self.dendrogram
    }

    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.dendrogram.n_items()
    }

    /// Flat clusters obtained by undoing every merge at distance `>= cutoff`.
    pub fn cut(&self, cutoff: f64) -> RawClusterLabels {
        RawClusterLabels::from_labels(self.dendrogram.cut_at_distance(cutoff))
    }

    /// Linkage matrix of the fitted tree.
    pub fn linkage_matrix(&self) -> Result<LinkageMatrix> {
        LinkageMatrix::from_dendrogram(&self.dendrogram)
    }

    /// Leaf order and link coordinates for drawing the dendrogram.
    pub fn layout(&self) -> DendrogramLayout {
        self.dendrogram.layout()
    }
}
