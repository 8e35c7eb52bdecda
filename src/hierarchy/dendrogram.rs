//! Dendrogram: merge history of an agglomerative clustering.
//!
//! Cluster ids follow the SciPy convention: leaves are `0..n`, and merge `i`
//! creates cluster `n + i`. Merge distances are usually non-decreasing, but
//! centroid and median linkage can produce inversions; those are kept as-is.

use crate::error::{Error, Result};

/// A dendrogram representing hierarchical cluster merges.
#[derive(Debug, Clone, PartialEq)]
pub struct Dendrogram {
    /// Merge history in merge order.
    merges: Vec<Merge>,
    /// Number of original items.
    n_items: usize,
}

/// A single merge operation in the dendrogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    /// First cluster being merged (index).
    pub cluster_a: usize,
    /// Second cluster being merged (index).
    pub cluster_b: usize,
    /// Distance/dissimilarity at which merge occurred.
    pub distance: f64,
}

/// Plot-ready dendrogram geometry, laid out the way SciPy's
/// `dendrogram(no_plot=True)` reports it.
///
/// Leaf `k` in [`leaves`](Self::leaves) sits at position `5 + 10k`; each link
/// is a U-shape given by four points `(icoord[i][p], dcoord[i][p])`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DendrogramLayout {
    /// Original item indices in display order.
    pub leaves: Vec<usize>,
    /// Positions along the leaf axis, one entry per link.
    pub icoord: Vec<[f64; 4]>,
    /// Heights (merge distances), one entry per link.
    pub dcoord: Vec<[f64; 4]>,
}

impl DendrogramLayout {
    /// Largest link height, 0 when there are no links.
    pub fn max_height(&self) -> f64 {
        self.dcoord
            .iter()
            .flat_map(|d| d.iter().copied())
            .fold(0.0, f64::max)
    }
}

enum Visit {
    Enter(usize),
    Exit(usize),
}

impl Dendrogram {
    /// Create a new dendrogram for n items.
    pub fn new(n_items: usize) -> Self {
        Self {
            merges: Vec::with_capacity(n_items.saturating_sub(1)),
            n_items,
        }
    }

    /// Record a merge operation.
    ///
    /// Both children must already exist: a leaf, or a cluster created by an
    /// earlier merge.
    pub fn add_merge(&mut self, cluster_a: usize, cluster_b: usize, distance: f64) -> Result<()> {
        let next_id = self.n_items + self.merges.len();
        if self.merges.len() + 1 >= self.n_items.max(1) {
            return Err(Error::InvalidInput(format!(
                "{} items allow at most {} merges",
                self.n_items,
                self.n_items.saturating_sub(1)
            )));
        }
        if cluster_a >= next_id || cluster_b >= next_id || cluster_a == cluster_b {
            return Err(Error::InvalidInput(format!(
                "merge {} references invalid clusters ({cluster_a}, {cluster_b})",
                self.merges.len()
            )));
        }
        if !distance.is_finite() {
            return Err(Error::InvalidInput(format!(
                "merge {} has non-finite distance",
                self.merges.len()
            )));
        }
        self.merges.push(Merge {
            cluster_a,
            cluster_b,
            distance,
        });
        Ok(())
    }

    /// Number of flat clusters obtained when cutting at `cutoff`.
    ///
    /// Every merge at distance `>= cutoff` is undone, so the count is one
    /// more than the number of such merges.
    pub fn n_clusters_at(&self, cutoff: f64) -> usize {
        let undone = self.merges.iter().filter(|m| m.distance >= cutoff).count();
        (undone + 1 + self.n_items.saturating_sub(1) - self.merges.len()).min(self.n_items)
    }

    /// Get cluster assignments at a given distance threshold.
    ///
    /// The merges with distance `>= cutoff` are cut. With inversions
    /// (non-monotonic linkage), the last merges in merge order are the
    /// ones undone, keeping the result a valid partition of the tree.
    pub fn cut_at_distance(&self, cutoff: f64) -> Vec<usize> {
        self.cut_to_k(self.n_clusters_at(cutoff))
    }

    /// Get cluster assignments for k clusters.
    ///
    /// Labels are numbered by first appearance: item 0 is in cluster 0, the
    /// first item not in cluster 0 is in cluster 1, and so on.
    pub fn cut_to_k(&self, k: usize) -> Vec<usize> {
        let k = k.clamp(1.min(self.n_items), self.n_items);
        let n_apply = (self.n_items - k).min(self.merges.len());

        // parent[c] = id of the cluster that absorbed c, if that merge is applied
        let mut parent: Vec<Option<usize>> = vec![None; self.n_items + n_apply];
        for (i, merge) in self.merges.iter().take(n_apply).enumerate() {
            let new_id = self.n_items + i;
            parent[merge.cluster_a] = Some(new_id);
            parent[merge.cluster_b] = Some(new_id);
        }

        let mut root_label: Vec<Option<usize>> = vec![None; parent.len()];
        let mut next_label = 0;
        (0..self.n_items)
            .map(|item| {
                let mut cid = item;
                while let Some(p) = parent[cid] {
                    cid = p;
                }
                *root_label[cid].get_or_insert_with(|| {
                    next_label += 1;
                    next_label - 1
                })
            })
            .collect()
    }

    /// Number of original items.
    pub fn n_items(&self) -> usize {
        self.n_items
    }

    /// Number of merges recorded.
    pub fn n_merges(&self) -> usize {
        self.merges.len()
    }

    /// Whether all items have been merged into a single tree.
    pub fn is_complete(&self) -> bool {
        self.merges.len() + 1 == self.n_items
    }

    /// Iterate over merges.
    pub fn merges(&self) -> impl Iterator<Item = &Merge> {
        self.merges.iter()
    }

    /// Get the merge distances (for visualization).
    pub fn distances(&self) -> Vec<f64> {
        self.merges.iter().map(|m| m.distance).collect()
    }

    /// Whether merge distances never decrease along the merge order.
    pub fn is_monotonic(&self) -> bool {
        self.merges.windows(2).all(|w| w[0].distance <= w[1].distance)
    }

    /// Root cluster ids, in ascending id order. One root for a complete tree.
    fn roots(&self) -> Vec<usize> {
        let total = self.n_items + self.merges.len();
        let mut has_parent = vec![false; total];
        for m in &self.merges {
            has_parent[m.cluster_a] = true;
            has_parent[m.cluster_b] = true;
        }
        (0..total).filter(|&c| !has_parent[c]).collect()
    }

    /// Leaves in dendrogram display order (left child before right child,
    /// starting from the root).
    pub fn leaf_order(&self) -> Vec<usize> {
        self.layout().leaves
    }

    /// Compute the dendrogram layout: leaf order plus link coordinates.
    ///
    /// Links are emitted in post-order, matching SciPy.
    pub fn layout(&self) -> DendrogramLayout {
        let total = self.n_items + self.merges.len();
        let mut position = vec![0.0; total];
        let mut height = vec![0.0; total];
        let mut layout = DendrogramLayout {
            leaves: Vec::with_capacity(self.n_items),
            icoord: Vec::with_capacity(self.merges.len()),
            dcoord: Vec::with_capacity(self.merges.len()),
        };

        let mut stack: Vec<Visit> = self.roots().into_iter().rev().map(Visit::Enter).collect();
        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(node) if node < self.n_items => {
                    position[node] = 5.0 + 10.0 * layout.leaves.len() as f64;
                    layout.leaves.push(node);
                }
                Visit::Enter(node) => {
                    let merge = &self.merges[node - self.n_items];
                    stack.push(Visit::Exit(node));
                    stack.push(Visit::Enter(merge.cluster_b));
                    stack.push(Visit::Enter(merge.cluster_a));
                }
                Visit::Exit(node) => {
                    let merge = &self.merges[node - self.n_items];
                    let (a, b) = (merge.cluster_a, merge.cluster_b);
                    let h = merge.distance;
                    layout
                        .icoord
                        .push([position[a], position[a], position[b], position[b]]);
                    layout.dcoord.push([height[a], h, h, height[b]]);
                    position[node] = (position[a] + position[b]) / 2.0;
                    height[node] = h;
                }
            }
        }
        layout
    }
}
