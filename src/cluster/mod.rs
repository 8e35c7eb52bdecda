//! Agglomerative clustering over precomputed distances.
//!
//! Bottom-up: start with each sample as its own cluster, repeatedly merge
//! the two closest clusters until one remains. The merge history forms a
//! **dendrogram**, a binary tree cut at a distance to get flat clusters.
//!
//! ```rust
//! use ndarray::array;
//! use opu_hca::cluster::{HierarchicalClustering, Linkage};
//! use opu_hca::Metric;
//!
//! let intens = array![[0.0], [0.1], [5.0], [5.1]];
//! let dist = Metric::Euclidean.compute(&intens).unwrap();
//! let model = HierarchicalClustering::new()
//!     .with_linkage(Linkage::Average)
//!     .fit(&dist)
//!     .unwrap();
//! assert_eq!(model.cut(1.0).labels(), &[0, 0, 1, 1]);
//! ```

mod hierarchical;
mod labels;

pub use hierarchical::{HierarchicalClustering, HierarchicalModel, Linkage};
pub use labels::RawClusterLabels;
