//! Run configuration for [`OpuClusteringEngine`](crate::OpuClusteringEngine).

use crate::cluster::Linkage;
use crate::cutoff::{CutoffSpec, DEFAULT_N_STEPS};
use crate::error::{Error, Result};
use crate::metric::Metric;
use crate::remap::MinClusterSize;

/// Configuration of one clustering run.
///
/// ```rust
/// use opu_hca::{CutoffSpec, Linkage, OpuConfig};
///
/// let config = OpuConfig::new()
///     .with_metric("cosine".parse().unwrap())
///     .with_cutoff(CutoffSpec::Bic)
///     .with_linkage(Linkage::Complete)
///     .with_max_opus(10)
///     .with_min_opu_size("0.05".parse().unwrap());
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OpuConfig {
    /// Distance metric.
    pub metric: Metric,
    /// Pinned cutoff or selection criterion.
    pub cutoff: CutoffSpec,
    /// Linkage rule of the agglomerative fit.
    pub linkage: Linkage,
    /// Maximum number of OPUs to keep; 0 keeps all.
    pub max_opus: usize,
    /// Minimum OPU size; `None` keeps clusters of any size.
    pub min_opu_size: Option<MinClusterSize>,
    /// Number of candidate cutoffs for criterion search.
    pub n_cutoff_steps: usize,
}

impl Default for OpuConfig {
    fn default() -> Self {
        Self {
            metric: Metric::default(),
            cutoff: CutoffSpec::default(),
            linkage: Linkage::default(),
            max_opus: 0,
            min_opu_size: None,
            n_cutoff_steps: DEFAULT_N_STEPS,
        }
    }
}

impl OpuConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the distance metric.
    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    /// Set the cutoff specification.
    pub fn with_cutoff(mut self, cutoff: CutoffSpec) -> Self {
        self.cutoff = cutoff;
        self
    }

    /// Set the linkage rule.
    pub fn with_linkage(mut self, linkage: Linkage) -> Self {
        self.linkage = linkage;
        self
    }

    /// Set the maximum number of OPUs (0 = unlimited).
    pub fn with_max_opus(mut self, max_opus: usize) -> Self {
        self.max_opus = max_opus;
        self
    }

    /// Set the minimum OPU size.
    pub fn with_min_opu_size(mut self, size: MinClusterSize) -> Self {
        self.min_opu_size = Some(size);
        self
    }

    /// Set the number of candidate cutoffs for criterion search.
    pub fn with_n_cutoff_steps(mut self, n: usize) -> Self {
        self.n_cutoff_steps = n;
        self
    }

    /// Check value ranges that the types alone do not enforce.
    pub fn validate(&self) -> Result<()> {
        self.cutoff.validate()?;
        if let Some(size) = &self.min_opu_size {
            size.validate()?;
        }
        if self.n_cutoff_steps == 0 {
            return Err(Error::config("n_cutoff_steps", "must be at least 1"));
        }
        Ok(())
    }

    /// Minimum OPU size as a count for `n_samples`.
    pub fn resolved_min_opu_size(&self, n_samples: usize) -> Result<usize> {
        self.min_opu_size
            .unwrap_or_default()
            .resolve(n_samples)
    }
}
