//! Rank raw clusters by size into OPU labels.
//!
//! Raw clusters are sorted by member count, largest first; ties keep the
//! order in which the clusters first appear in the samples. Walking that
//! list, position `i` becomes OPU rank `i` when the cluster has at least the
//! minimum size. With a nonzero cap, the walk stops after `max_opus`
//! positions.
//!
//! A cluster rejected for size still uses up its position toward the cap.
//! Counts never increase along the walk, so once one cluster is rejected
//! every later one is too, and the kept ranks are always `0..k`.

use std::cmp::{Ordering, Reverse};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::cluster::RawClusterLabels;
use crate::error::{Error, Result};

/// Output label of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OpuLabel {
    /// Member of the OPU with this rank (0 = largest).
    Rank(usize),
    /// Member of a cluster that was filtered out.
    Unassigned,
}

impl OpuLabel {
    /// Rank, if assigned.
    pub fn rank(&self) -> Option<usize> {
        match self {
            OpuLabel::Rank(r) => Some(*r),
            OpuLabel::Unassigned => None,
        }
    }

    /// Whether this sample belongs to a retained OPU.
    pub fn is_assigned(&self) -> bool {
        matches!(self, OpuLabel::Rank(_))
    }
}

impl Ord for OpuLabel {
    /// Ranks ascending, `Unassigned` last.
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (OpuLabel::Rank(a), OpuLabel::Rank(b)) => a.cmp(b),
            (OpuLabel::Rank(_), OpuLabel::Unassigned) => Ordering::Less,
            (OpuLabel::Unassigned, OpuLabel::Rank(_)) => Ordering::Greater,
            (OpuLabel::Unassigned, OpuLabel::Unassigned) => Ordering::Equal,
        }
    }
}

impl PartialOrd for OpuLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for OpuLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpuLabel::Rank(r) => write!(f, "{r}"),
            OpuLabel::Unassigned => f.write_str("-"),
        }
    }
}

/// Minimum OPU size: an absolute count or a fraction of all samples.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MinClusterSize {
    /// At least this many samples.
    Count(usize),
    /// At least `ceil(fraction * n_samples)` samples; fraction in `[0, 1]`.
    Fraction(f64),
}

impl Default for MinClusterSize {
    fn default() -> Self {
        MinClusterSize::Count(0)
    }
}

impl MinClusterSize {
    /// Interpret a number: integral values are counts, others fractions.
    pub fn from_value(value: f64) -> Result<Self> {
        let out_of_range = || {
            Error::config(
                "min_opu_size",
                format!(
                    "must be a non-negative integer or a fraction between 0 and 1, got '{value}'"
                ),
            )
        };
        if !value.is_finite() || value < 0.0 {
            return Err(out_of_range());
        }
        if value.fract() == 0.0 {
            if value > usize::MAX as f64 {
                return Err(out_of_range());
            }
            return Ok(MinClusterSize::Count(value as usize));
        }
        if value > 1.0 {
            return Err(out_of_range());
        }
        Ok(MinClusterSize::Fraction(value))
    }

    /// Check a value built directly from its variants.
    pub fn validate(&self) -> Result<()> {
        match *self {
            MinClusterSize::Count(_) => Ok(()),
            MinClusterSize::Fraction(f) if (0.0..=1.0).contains(&f) => Ok(()),
            MinClusterSize::Fraction(f) => Err(Error::config(
                "min_opu_size",
                format!("fraction must lie in [0, 1], got {f}"),
            )),
        }
    }

    /// Absolute count for a dataset of `n_samples`.
    pub fn resolve(&self, n_samples: usize) -> Result<usize> {
        self.validate()?;
        Ok(match *self {
            MinClusterSize::Count(c) => c,
            MinClusterSize::Fraction(f) => (f * n_samples as f64).ceil() as usize,
        })
    }
}

impl FromStr for MinClusterSize {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let value: f64 = s.trim().parse().map_err(|_| {
            Error::config(
                "min_opu_size",
                format!("must be a non-negative integer or a fraction between 0 and 1, got '{s}'"),
            )
        })?;
        Self::from_value(value)
    }
}

impl fmt::Display for MinClusterSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MinClusterSize::Count(c) => write!(f, "{c}"),
            MinClusterSize::Fraction(v) => write!(f, "{v}"),
        }
    }
}

/// Raw cluster id → OPU rank.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LabelRemap {
    /// `(raw id, count)` of each retained cluster, indexed by rank.
    retained: Vec<(usize, usize)>,
    /// Rank of each raw id, `None` if filtered.
    by_raw: Vec<Option<usize>>,
}

impl LabelRemap {
    /// Rank and filter the clusters of `raw`.
    ///
    /// `max_opus == 0` means no cap.
    pub fn build(raw: &RawClusterLabels, min_size: usize, max_opus: usize) -> Result<Self> {
        let sizes = raw.sizes();
        // raw ids are numbered by first appearance, so a stable sort by
        // descending count breaks ties by first appearance
        let mut order: Vec<usize> = (0..sizes.len()).collect();
        order.sort_by_key(|&id| Reverse(sizes[id]));

        let mut retained = Vec::new();
        let mut by_raw = vec![None; sizes.len()];
        for (rank, &id) in order.iter().enumerate() {
            if max_opus != 0 && rank >= max_opus {
                break;
            }
            if sizes[id] >= min_size {
                by_raw[id] = Some(rank);
                retained.push((id, sizes[id]));
            }
        }

        if retained.is_empty() {
            return Err(Error::NoCluster {
                min_size,
                largest: sizes.iter().copied().max().unwrap_or(0),
                n_clusters: sizes.len(),
            });
        }
        Ok(Self { retained, by_raw })
    }

    /// Number of retained OPUs.
    pub fn len(&self) -> usize {
        self.retained.len()
    }

    /// Whether no OPU was retained (never true for a built remap).
    pub fn is_empty(&self) -> bool {
        self.retained.is_empty()
    }

    /// Rank of raw cluster `raw_id`, if retained.
    pub fn rank_of(&self, raw_id: usize) -> Option<usize> {
        self.by_raw.get(raw_id).copied().flatten()
    }

    /// Output label of raw cluster `raw_id`.
    pub fn label_of(&self, raw_id: usize) -> OpuLabel {
        self.rank_of(raw_id)
            .map_or(OpuLabel::Unassigned, OpuLabel::Rank)
    }

    /// Translate raw labels into per-sample output labels.
    pub fn apply(&self, raw: &RawClusterLabels) -> Vec<OpuLabel> {
        raw.labels().iter().map(|&l| self.label_of(l)).collect()
    }

    /// Member count of each retained OPU, by rank.
    pub fn sizes(&self) -> Vec<usize> {
        self.retained.iter().map(|&(_, count)| count).collect()
    }

    /// `(rank, raw id)` pairs in rank order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.retained.iter().enumerate().map(|(rank, &(id, _))| (rank, id))
    }

    /// Raw id → rank as a map.
    pub fn to_map(&self) -> BTreeMap<usize, usize> {
        self.iter().map(|(rank, id)| (id, rank)).collect()
    }
}
