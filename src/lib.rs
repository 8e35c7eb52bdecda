//! # opu-hca
//!
//! Hierarchical clustering of spectral samples (Raman-type spectra) into
//! ranked groups, "OPUs".
//!
//! One run goes: intensities → pairwise distances ([`Metric`]) → agglomerative
//! merge tree ([`cluster`]) → cutoff, pinned or chosen by AIC/BIC search
//! ([`cutoff`]) → flat clusters → size-ranked OPU labels ([`remap`]).
//! [`OpuClusteringEngine`] drives the run and publishes an [`OpuModel`].
//!
//! ```rust
//! use ndarray::array;
//! use opu_hca::{CutoffSpec, OpuClusteringEngine, OpuConfig, OpuLabel};
//!
//! let intens = array![
//!     [0.0, 1.0], [0.1, 1.0], [0.0, 1.1],
//!     [4.0, 0.0], [4.1, 0.1],
//!     [9.0, 9.0],
//! ];
//! let mut engine = OpuClusteringEngine::from_intensities(intens).unwrap();
//! let model = engine
//!     .run(&OpuConfig::new().with_cutoff(CutoffSpec::Fixed(1.0)))
//!     .unwrap();
//!
//! assert_eq!(model.cluster_sizes(), vec![3, 2, 1]);
//! assert_eq!(model.opu_labels()[5], OpuLabel::Rank(2));
//! ```

pub mod cluster;
pub mod config;
pub mod cutoff;
pub mod engine;
/// Error types used across `opu_hca`.
pub mod error;
pub mod export;
pub mod hierarchy;
pub mod metric;
pub mod remap;

#[cfg(test)]
mod engine_tests;

pub use cluster::{HierarchicalClustering, HierarchicalModel, Linkage, RawClusterLabels};
pub use config::OpuConfig;
pub use cutoff::{CutoffOptimizer, CutoffSpec};
pub use engine::{OpuClusteringEngine, OpuModel, Stage};
pub use error::{Error, Result};
pub use hierarchy::{Dendrogram, DendrogramLayout, LinkageMatrix, LinkageRow};
pub use metric::{DistanceMatrix, Metric};
pub use remap::{LabelRemap, MinClusterSize, OpuLabel};
