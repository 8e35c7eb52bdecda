//! OPU clustering engine: one run from intensities to ranked labels.
//!
//! ```text
//! uninitialized → distances_computed → cutoff_finalized
//!               → clusters_cut → labels_remapped → ready
//! ```
//!
//! [`OpuClusteringEngine::run`] walks every stage in order. Nothing derived
//! from the run is readable before `ready`; accessors return
//! [`Error::NotReady`] naming the first missing stage. A `ready` engine is
//! frozen until [`reset`](OpuClusteringEngine::reset).

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use tracing::{debug, info};

use crate::cluster::{HierarchicalClustering, HierarchicalModel, RawClusterLabels};
use crate::config::OpuConfig;
use crate::cutoff::{cutoff_grid, OptimizeContext};
use crate::error::{Error, Result};
use crate::export;
use crate::hierarchy::{DendrogramLayout, LinkageMatrix};
use crate::metric::{validate_intensity, DistanceMatrix};
use crate::remap::{LabelRemap, OpuLabel};

/// Progress of an engine through a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Nothing computed.
    Uninitialized,
    /// Pairwise distances are available.
    DistancesComputed,
    /// The cutoff has been chosen.
    CutoffFinalized,
    /// The tree has been cut into raw clusters.
    ClustersCut,
    /// Raw clusters have been ranked into OPUs.
    LabelsRemapped,
    /// The model is published and immutable.
    Ready,
}

impl Stage {
    /// The stage that follows this one.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Uninitialized => Some(Stage::DistancesComputed),
            Stage::DistancesComputed => Some(Stage::CutoffFinalized),
            Stage::CutoffFinalized => Some(Stage::ClustersCut),
            Stage::ClustersCut => Some(Stage::LabelsRemapped),
            Stage::LabelsRemapped => Some(Stage::Ready),
            Stage::Ready => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Stage::Uninitialized => "uninitialized",
            Stage::DistancesComputed => "distances_computed",
            Stage::CutoffFinalized => "cutoff_finalized",
            Stage::ClustersCut => "clusters_cut",
            Stage::LabelsRemapped => "labels_remapped",
            Stage::Ready => "ready",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a finished run produced. Read-only.
#[derive(Debug, Clone)]
pub struct OpuModel {
    config: OpuConfig,
    distances: DistanceMatrix,
    hierarchy: HierarchicalModel,
    linkage_matrix: LinkageMatrix,
    layout: DendrogramLayout,
    cutoff: f64,
    cutoff_description: String,
    raw_labels: RawClusterLabels,
    remap: LabelRemap,
    min_opu_size: usize,
    opu_labels: Vec<OpuLabel>,
}

impl OpuModel {
    /// Configuration the run used.
    pub fn config(&self) -> &OpuConfig {
        &self.config
    }

    /// Pairwise distance matrix.
    pub fn distances(&self) -> &DistanceMatrix {
        &self.distances
    }

    /// Fitted merge tree.
    pub fn hierarchy(&self) -> &HierarchicalModel {
        &self.hierarchy
    }

    /// Linkage matrix of the merge tree.
    pub fn linkage_matrix(&self) -> &LinkageMatrix {
        &self.linkage_matrix
    }

    /// Dendrogram leaf order and link coordinates.
    pub fn layout(&self) -> &DendrogramLayout {
        &self.layout
    }

    /// Samples in dendrogram display order.
    pub fn leaf_order(&self) -> &[usize] {
        &self.layout.leaves
    }

    /// Distance matrix with rows and columns in leaf order, for heatmaps.
    pub fn heatmap(&self) -> Result<Array2<f64>> {
        self.distances.reordered(&self.layout.leaves)
    }

    /// Final cutoff distance.
    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Final cutoff with the strategy that produced it, e.g. `1.20(BIC)`.
    pub fn cutoff_description(&self) -> &str {
        &self.cutoff_description
    }

    /// Number of raw clusters at the final cutoff.
    pub fn n_clusters(&self) -> usize {
        self.raw_labels.n_clusters()
    }

    /// Raw cluster id of each sample.
    pub fn raw_labels(&self) -> &RawClusterLabels {
        &self.raw_labels
    }

    /// Raw id → OPU rank mapping.
    pub fn label_remap(&self) -> &LabelRemap {
        &self.remap
    }

    /// Minimum OPU size, resolved to a count.
    pub fn min_opu_size(&self) -> usize {
        self.min_opu_size
    }

    /// OPU label of each sample, in sample order.
    pub fn opu_labels(&self) -> &[OpuLabel] {
        &self.opu_labels
    }

    /// Distinct labels present, ranks ascending with `Unassigned` last.
    pub fn unique_opu_labels(&self) -> Vec<OpuLabel> {
        let mut labels = self.opu_labels.clone();
        labels.sort_unstable();
        labels.dedup();
        labels
    }

    /// Number of retained OPUs.
    pub fn n_opus(&self) -> usize {
        self.remap.len()
    }

    /// Member count of each retained OPU, by rank.
    pub fn cluster_sizes(&self) -> Vec<usize> {
        self.remap.sizes()
    }

    /// Membership mask of OPU `rank` over all samples.
    pub fn opu_mask(&self, rank: usize) -> Vec<bool> {
        self.opu_labels
            .iter()
            .map(|l| *l == OpuLabel::Rank(rank))
            .collect()
    }

    /// Membership mask of every retained OPU, by rank.
    pub fn opu_masks(&self) -> Vec<Vec<bool>> {
        (0..self.n_opus()).map(|rank| self.opu_mask(rank)).collect()
    }

    /// Per-group count of each OPU label. `groups[i]` is the external key
    /// (e.g. biosample) of sample `i`.
    pub fn count_group_labels<S: AsRef<str>>(
        &self,
        groups: &[S],
    ) -> Result<BTreeMap<String, BTreeMap<OpuLabel, usize>>> {
        crosstab(groups, &self.opu_labels)
    }

    /// Per-group count of each raw cluster id.
    pub fn count_group_raw_labels<S: AsRef<str>>(
        &self,
        groups: &[S],
    ) -> Result<BTreeMap<String, BTreeMap<usize, usize>>> {
        crosstab(groups, self.raw_labels.labels())
    }

    /// One-line description of the run.
    pub fn summary(&self) -> String {
        format!(
            "metric={}; linkage={}; cutoff={}; raw clusters={}; OPU min. size={}",
            self.config.metric.display_name(),
            self.config.linkage,
            self.cutoff_description,
            self.n_clusters(),
            self.min_opu_size,
        )
    }
}

fn crosstab<S: AsRef<str>, L: Ord + Copy>(
    groups: &[S],
    labels: &[L],
) -> Result<BTreeMap<String, BTreeMap<L, usize>>> {
    if groups.len() != labels.len() {
        return Err(Error::DimensionMismatch {
            expected: labels.len(),
            found: groups.len(),
        });
    }
    let mut out: BTreeMap<String, BTreeMap<L, usize>> = BTreeMap::new();
    for (group, &label) in groups.iter().zip(labels) {
        *out.entry(group.as_ref().to_string())
            .or_default()
            .entry(label)
            .or_default() += 1;
    }
    Ok(out)
}

/// Orchestrates one clustering run over a fixed dataset.
#[derive(Debug, Clone)]
pub struct OpuClusteringEngine {
    intens: Array2<f64>,
    sample_names: Vec<String>,
    stage: Stage,
    model: Option<OpuModel>,
}

impl OpuClusteringEngine {
    /// Engine over `intens` (one spectrum per row) with one name per row.
    pub fn new(intens: Array2<f64>, sample_names: Vec<String>) -> Result<Self> {
        validate_intensity(&intens)?;
        if sample_names.len() != intens.nrows() {
            return Err(Error::DimensionMismatch {
                expected: intens.nrows(),
                found: sample_names.len(),
            });
        }
        Ok(Self {
            intens,
            sample_names,
            stage: Stage::Uninitialized,
            model: None,
        })
    }

    /// Engine with generated names `sample_0`, `sample_1`, ...
    pub fn from_intensities(intens: Array2<f64>) -> Result<Self> {
        let names = (0..intens.nrows()).map(|i| format!("sample_{i}")).collect();
        Self::new(intens, names)
    }

    /// Current stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Whether a model is available.
    pub fn is_ready(&self) -> bool {
        self.stage == Stage::Ready
    }

    /// Input intensities.
    pub fn intensities(&self) -> &Array2<f64> {
        &self.intens
    }

    /// Sample names, in row order.
    pub fn sample_names(&self) -> &[String] {
        &self.sample_names
    }

    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.intens.nrows()
    }

    /// Drop any model and return to `uninitialized`.
    pub fn reset(&mut self) {
        self.stage = Stage::Uninitialized;
        self.model = None;
    }

    /// Run the full pipeline with `config`.
    ///
    /// On error the engine keeps the last stage it completed and publishes no
    /// model; it can be run again.
    pub fn run(&mut self, config: &OpuConfig) -> Result<&OpuModel> {
        if self.stage == Stage::Ready {
            return Err(Error::AlreadyRun);
        }
        self.stage = Stage::Uninitialized;
        config.validate()?;
        let n = self.n_samples();
        let min_opu_size = config.resolved_min_opu_size(n)?;
        info!(
            n_samples = n,
            n_channels = self.intens.ncols(),
            metric = %config.metric,
            linkage = %config.linkage,
            cutoff = %config.cutoff,
            "starting OPU clustering"
        );

        let distances = config.metric.compute(&self.intens)?;
        self.advance(Stage::DistancesComputed);

        let hierarchy = HierarchicalClustering::new()
            .with_linkage(config.linkage)
            .fit(&distances)?;
        let candidates = cutoff_grid(&distances, config.n_cutoff_steps)?;
        let mut optimizer = config.cutoff.optimizer();
        let cutoff = optimizer.optimize(&OptimizeContext {
            model: &hierarchy,
            intens: &self.intens,
            candidates: &candidates,
        })?;
        let cutoff_description = optimizer
            .describe()
            .unwrap_or_else(|| format!("{cutoff:.2}"));
        self.advance(Stage::CutoffFinalized);

        let raw_labels = hierarchy.cut(cutoff);
        let linkage_matrix = hierarchy.linkage_matrix()?;
        let layout = hierarchy.layout();
        self.advance(Stage::ClustersCut);

        let remap = LabelRemap::build(&raw_labels, min_opu_size, config.max_opus)?;
        let opu_labels = remap.apply(&raw_labels);
        self.advance(Stage::LabelsRemapped);

        info!(
            cutoff = %cutoff_description,
            n_clusters = raw_labels.n_clusters(),
            n_opus = remap.len(),
            unassigned = opu_labels.iter().filter(|l| !l.is_assigned()).count(),
            "OPU clustering finished"
        );
        self.advance(Stage::Ready);
        Ok(self.model.insert(OpuModel {
            config: config.clone(),
            distances,
            hierarchy,
            linkage_matrix,
            layout,
            cutoff,
            cutoff_description,
            raw_labels,
            remap,
            min_opu_size,
            opu_labels,
        }))
    }

    fn advance(&mut self, to: Stage) {
        debug!(from = %self.stage, to = %to, "stage transition");
        self.stage = to;
    }

    /// The finished model.
    pub fn model(&self) -> Result<&OpuModel> {
        match (&self.model, self.stage) {
            (Some(model), Stage::Ready) => Ok(model),
            _ => Err(Error::NotReady {
                stage: self.stage,
                missing: self.stage.next().unwrap_or(Stage::Ready),
            }),
        }
    }

    /// Final cutoff distance.
    pub fn cutoff(&self) -> Result<f64> {
        Ok(self.model()?.cutoff())
    }

    /// Number of raw clusters at the final cutoff.
    pub fn n_clusters(&self) -> Result<usize> {
        Ok(self.model()?.n_clusters())
    }

    /// Raw cluster id of each sample.
    pub fn raw_labels(&self) -> Result<&RawClusterLabels> {
        Ok(self.model()?.raw_labels())
    }

    /// Raw id → OPU rank mapping.
    pub fn label_remap(&self) -> Result<&LabelRemap> {
        Ok(self.model()?.label_remap())
    }

    /// OPU label of each sample.
    pub fn opu_labels(&self) -> Result<&[OpuLabel]> {
        Ok(self.model()?.opu_labels())
    }

    /// Distinct labels present, `Unassigned` last.
    pub fn unique_opu_labels(&self) -> Result<Vec<OpuLabel>> {
        Ok(self.model()?.unique_opu_labels())
    }

    /// Member count of each retained OPU, by rank.
    pub fn cluster_sizes(&self) -> Result<Vec<usize>> {
        Ok(self.model()?.cluster_sizes())
    }

    /// Membership mask of every retained OPU, by rank.
    pub fn opu_masks(&self) -> Result<Vec<Vec<bool>>> {
        Ok(self.model()?.opu_masks())
    }

    /// Write `name<TAB>label` lines, `-` for unassigned samples.
    pub fn write_opu_labels<W: Write>(&self, writer: W) -> Result<()> {
        let model = self.model()?;
        export::write_opu_labels(writer, &self.sample_names, model.opu_labels(), "\t")
    }

    /// Hand each retained OPU's mask to `write` with its target path.
    ///
    /// See [`export::save_opu_collections`].
    pub fn save_opu_collections<F>(
        &self,
        prefix: &str,
        source: Option<&Path>,
        write: F,
    ) -> Result<Vec<PathBuf>>
    where
        F: FnMut(&Path, &[bool]) -> Result<()>,
    {
        export::save_opu_collections(self.model()?, prefix, source, write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn engine() -> OpuClusteringEngine {
        let intens = array![[0.0], [0.1], [5.0], [5.1], [5.2], [20.0]];
        OpuClusteringEngine::from_intensities(intens).unwrap()
    }

    #[test]
    fn test_stage_order() {
        let mut stage = Stage::Uninitialized;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            assert!(next > stage);
            stage = next;
            seen.push(stage);
        }
        assert_eq!(seen.len(), 6);
        assert_eq!(stage, Stage::Ready);
    }

    #[test]
    fn test_not_ready_before_run() {
        let engine = engine();
        match engine.n_clusters() {
            Err(Error::NotReady { stage, missing }) => {
                assert_eq!(stage, Stage::Uninitialized);
                assert_eq!(missing, Stage::DistancesComputed);
            }
            other => panic!("expected NotReady, got {other:?}"),
        }
        assert!(engine.write_opu_labels(Vec::<u8>::new()).is_err());
    }

    #[test]
    fn test_run_and_freeze() {
        let mut engine = engine();
        let model = engine.run(&OpuConfig::default()).unwrap();
        assert_eq!(model.cluster_sizes(), vec![3, 2, 1]);
        assert_eq!(engine.stage(), Stage::Ready);
        assert!(matches!(
            engine.run(&OpuConfig::default()),
            Err(Error::AlreadyRun)
        ));

        engine.reset();
        assert!(engine.model().is_err());
        let model = engine
            .run(&OpuConfig::default().with_max_opus(1))
            .unwrap();
        assert_eq!(model.n_opus(), 1);
        assert_eq!(engine.opu_masks().unwrap().len(), 1);
        assert_eq!(
            engine.unique_opu_labels().unwrap(),
            vec![OpuLabel::Rank(0), OpuLabel::Unassigned]
        );
        assert_eq!(engine.raw_labels().unwrap().n_clusters(), 3);
    }

    #[test]
    fn test_failed_run_keeps_partial_stage() {
        let mut engine = engine();
        let config = OpuConfig::default().with_min_opu_size(crate::MinClusterSize::Count(4));
        assert!(matches!(engine.run(&config), Err(Error::NoCluster { .. })));
        assert_eq!(engine.stage(), Stage::ClustersCut);
        assert!(matches!(
            engine.model(),
            Err(Error::NotReady {
                missing: Stage::LabelsRemapped,
                ..
            })
        ));
        // a failed run can be retried with another configuration
        assert!(engine.run(&OpuConfig::default()).is_ok());
    }

    #[test]
    fn test_config_error_before_any_work() {
        let mut engine = engine();
        let config = OpuConfig::default().with_n_cutoff_steps(0);
        assert!(matches!(
            engine.run(&config),
            Err(Error::Configuration { .. })
        ));
        assert_eq!(engine.stage(), Stage::Uninitialized);
    }

    #[test]
    fn test_name_count_must_match() {
        let intens = array![[0.0], [1.0]];
        assert!(matches!(
            OpuClusteringEngine::new(intens, vec!["a".into()]),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_crosstab() {
        let mut engine = engine();
        let model = engine
            .run(&OpuConfig::default().with_min_opu_size(crate::MinClusterSize::Count(2)))
            .unwrap();
        let groups = ["a", "a", "b", "b", "b", "b"];
        let table = model.count_group_labels(&groups).unwrap();
        assert_eq!(table["a"][&OpuLabel::Rank(1)], 2);
        assert_eq!(table["b"][&OpuLabel::Rank(0)], 3);
        assert_eq!(table["b"][&OpuLabel::Unassigned], 1);
        let raw = model.count_group_raw_labels(&groups).unwrap();
        assert_eq!(raw["a"][&0usize], 2);
        assert!(model.count_group_labels(&["a"]).is_err());
    }
}
