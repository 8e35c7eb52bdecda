//! Flat cluster assignments read off a merge tree.

use std::collections::HashMap;

/// Sample index → internal cluster id.
///
/// Ids are dense (`0..n_clusters`) and numbered by first appearance in
/// sample order, so sample 0 is always in cluster 0. They carry no meaning
/// beyond identity; output labels come from [`LabelRemap`](crate::LabelRemap).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawClusterLabels {
    labels: Vec<usize>,
    n_clusters: usize,
}

impl RawClusterLabels {
    /// Renumber arbitrary cluster ids by first appearance.
    pub fn from_labels(labels: Vec<usize>) -> Self {
        let mut seen: HashMap<usize, usize> = HashMap::new();
        let labels: Vec<usize> = labels
            .into_iter()
            .map(|l| {
                let next = seen.len();
                *seen.entry(l).or_insert(next)
            })
            .collect();
        Self {
            labels,
            n_clusters: seen.len(),
        }
    }

    /// Cluster id of each sample.
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether there are no samples.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of distinct clusters.
    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    /// Member count of every cluster, indexed by cluster id.
    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &l in &self.labels {
            sizes[l] += 1;
        }
        sizes
    }

    /// Indices of the samples in cluster `id`.
    pub fn members(&self, id: usize) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, &l)| l == id)
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_appearance_numbering() {
        let raw = RawClusterLabels::from_labels(vec![7, 3, 7, 9, 3]);
        assert_eq!(raw.labels(), &[0, 1, 0, 2, 1]);
        assert_eq!(raw.n_clusters(), 3);
        assert_eq!(raw.sizes(), vec![2, 2, 1]);
        assert_eq!(raw.members(1), vec![1, 4]);
    }

    #[test]
    fn test_renumbering_many_clusters() {
        // reversed singleton ids: every sample opens a new cluster
        let n = 20_000;
        let raw = RawClusterLabels::from_labels((0..n).rev().collect());
        assert_eq!(raw.n_clusters(), n);
        assert_eq!(raw.labels()[0], 0);
        assert_eq!(raw.labels()[n - 1], n - 1);

        let sparse = RawClusterLabels::from_labels(vec![usize::MAX, 5, usize::MAX, 0]);
        assert_eq!(sparse.labels(), &[0, 1, 0, 2]);
    }
}
