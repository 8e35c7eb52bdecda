//! Merge-tree structures produced by agglomerative clustering.
//!
//! - [`Dendrogram`]: merge history with distance cuts, leaf ordering and
//!   plot layout.
//! - [`LinkageMatrix`]: the 4-column `(child_a, child_b, distance, size)` form
//!   consumed by dendrogram-ordering code.
//!
//! ```text
//!         8 (height=3.0)
//!        / \
//!       4   7 (height=1.0)
//!          / \
//!         5   6 (height=0.5, 0.7)
//!        / \ / \
//!       0  1 2  3 (leaves)
//! ```
//!
//! Cutting below 0.7 keeps `{0, 1}` together and leaves 2, 3 and 4 apart.

mod dendrogram;
mod linkage;

pub use dendrogram::{Dendrogram, DendrogramLayout, Merge};
pub use linkage::{LinkageMatrix, LinkageRow};
