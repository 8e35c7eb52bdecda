#[cfg(test)]
mod tests {
    use crate::cutoff::{cutoff_grid, OptimizeContext};
    use crate::export::opu_collection_path;
    use crate::{
        CutoffSpec, Error, HierarchicalClustering, LabelRemap, Linkage, Metric, MinClusterSize,
        OpuClusteringEngine, OpuConfig, OpuLabel, RawClusterLabels, Result,
    };
    use ndarray::{array, Array2};
    use proptest::prelude::*;
    use std::path::PathBuf;

    /// Two tight pairs ({1, 3} and {2, 5}) and two singletons (0 and 4).
    fn pairs_and_singletons() -> Array2<f64> {
        array![[5.0], [0.0], [10.0], [0.2], [20.0], [10.3]]
    }

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("cell_{i}")).collect()
    }

    #[test]
    fn test_pairs_and_singletons_ranked_by_size() -> Result<()> {
        let mut engine = OpuClusteringEngine::new(pairs_and_singletons(), names(6))?;
        let config = OpuConfig::new()
            .with_cutoff(CutoffSpec::Fixed(0.7))
            .with_linkage(Linkage::Average)
            .with_min_opu_size(MinClusterSize::Count(1));
        let model = engine.run(&config)?;

        assert_eq!(model.n_clusters(), 4);
        assert_eq!(model.cluster_sizes(), vec![2, 2, 1, 1]);
        // ties keep first appearance: pair {1,3} before {2,5}, singleton 0 before 4
        let ranks: Vec<Option<usize>> = model.opu_labels().iter().map(|l| l.rank()).collect();
        assert_eq!(ranks, vec![Some(2), Some(0), Some(1), Some(0), Some(3), Some(1)]);
        assert_eq!(
            model.unique_opu_labels(),
            (0..4).map(OpuLabel::Rank).collect::<Vec<_>>()
        );
        assert_eq!(model.cutoff(), 0.7);
        assert_eq!(model.cutoff_description(), "0.70");
        Ok(())
    }

    #[test]
    fn test_min_size_above_every_cluster_is_no_cluster() {
        let mut engine = OpuClusteringEngine::from_intensities(pairs_and_singletons()).unwrap();
        let config = OpuConfig::new()
            .with_cutoff(CutoffSpec::Fixed(0.7))
            .with_min_opu_size(MinClusterSize::Count(3));
        let err = engine.run(&config).unwrap_err();
        assert!(matches!(
            err,
            Error::NoCluster {
                min_size: 3,
                largest: 2,
                ..
            }
        ));
        assert!(engine.opu_labels().is_err());
    }

    #[test]
    fn test_min_size_filters_singletons() -> Result<()> {
        let mut engine = OpuClusteringEngine::from_intensities(pairs_and_singletons())?;
        let model = engine.run(
            &OpuConfig::new()
                .with_cutoff(CutoffSpec::Fixed(0.7))
                .with_min_opu_size(MinClusterSize::Fraction(0.3)),
        )?;
        // ceil(0.3 * 6) = 2
        assert_eq!(model.min_opu_size(), 2);
        assert_eq!(model.n_opus(), 2);
        assert_eq!(model.opu_labels()[0], OpuLabel::Unassigned);
        assert_eq!(model.opu_labels()[4], OpuLabel::Unassigned);
        assert_eq!(
            model.unique_opu_labels(),
            vec![OpuLabel::Rank(0), OpuLabel::Rank(1), OpuLabel::Unassigned]
        );
        Ok(())
    }

    #[test]
    fn test_criteria_on_identical_spectra() -> Result<()> {
        let intens = Array2::from_elem((5, 3), 2.5);
        for spec in [CutoffSpec::Aic, CutoffSpec::Bic] {
            let mut engine = OpuClusteringEngine::from_intensities(intens.clone())?;
            let model = engine.run(&OpuConfig::new().with_cutoff(spec))?;
            assert_eq!(model.cutoff(), 0.0);
            assert_eq!(model.distances().max(), 0.0);
            assert_eq!(model.n_clusters(), 5);
        }
        Ok(())
    }

    #[test]
    fn test_fixed_cutoff_survives_any_grid() -> Result<()> {
        let intens = pairs_and_singletons();
        let dist = Metric::Euclidean.compute(&intens)?;
        let model = HierarchicalClustering::new().fit(&dist)?;
        for n_steps in [1, 7, 100] {
            let grid = cutoff_grid(&dist, n_steps)?;
            let mut opt = CutoffSpec::Fixed(3.25).optimizer();
            let ctx = OptimizeContext {
                model: &model,
                intens: &intens,
                candidates: &grid,
            };
            assert_eq!(opt.optimize(&ctx)?, 3.25);
        }
        Ok(())
    }

    #[test]
    fn test_repeat_runs_are_identical() -> Result<()> {
        let intens = array![
            [1.0, 0.2, 0.1],
            [1.1, 0.2, 0.0],
            [0.9, 0.3, 0.1],
            [0.1, 1.0, 0.9],
            [0.0, 1.2, 1.0],
            [0.5, 0.5, 0.5],
            [0.1, 1.1, 0.8],
        ];
        let config = OpuConfig::new()
            .with_metric(Metric::Cosine)
            .with_cutoff(CutoffSpec::Bic)
            .with_linkage(Linkage::Complete);

        let mut first = OpuClusteringEngine::from_intensities(intens.clone())?;
        let mut second = OpuClusteringEngine::from_intensities(intens)?;
        let a = first.run(&config)?;
        let b = second.run(&config)?;
        assert_eq!(a.label_remap(), b.label_remap());
        assert_eq!(a.opu_labels(), b.opu_labels());
        assert_eq!(a.cutoff(), b.cutoff());
        assert_eq!(a.linkage_matrix(), b.linkage_matrix());
        Ok(())
    }

    #[test]
    fn test_model_exports_for_plotting() -> Result<()> {
        let mut engine = OpuClusteringEngine::from_intensities(pairs_and_singletons())?;
        let model = engine.run(&OpuConfig::new().with_cutoff(CutoffSpec::Aic))?;

        assert_eq!(model.linkage_matrix().len(), 5);
        assert_eq!(model.linkage_matrix().rows()[4].size, 6);

        let mut leaves = model.leaf_order().to_vec();
        leaves.sort_unstable();
        assert_eq!(leaves, (0..6).collect::<Vec<_>>());

        let heatmap = model.heatmap()?;
        let order = model.leaf_order();
        assert_eq!(heatmap[[0, 1]], model.distances().get(order[0], order[1]));
        assert!(model.cutoff_description().ends_with("(AIC)"));
        assert!(model.summary().contains("linkage=average"));
        Ok(())
    }

    #[test]
    fn test_label_file_and_collections() -> Result<()> {
        let mut engine = OpuClusteringEngine::new(pairs_and_singletons(), names(6))?;
        engine.run(
            &OpuConfig::new()
                .with_cutoff(CutoffSpec::Fixed(0.7))
                .with_min_opu_size(MinClusterSize::Count(2)),
        )?;

        let mut buf = Vec::<u8>::new();
        engine.write_opu_labels(&mut buf)?;
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "cell_0\t-");
        assert_eq!(lines[1], "cell_1\t0");
        assert_eq!(lines.len(), 6);

        let mut seen: Vec<(PathBuf, Vec<bool>)> = Vec::new();
        let written = engine.save_opu_collections("run", None, |path, mask| {
            seen.push((path.to_path_buf(), mask.to_vec()));
            Ok(())
        })?;
        assert_eq!(
            written,
            vec![PathBuf::from("run.OPU_00.txt"), PathBuf::from("run.OPU_01.txt")]
        );
        assert_eq!(seen[0].1, vec![false, true, false, true, false, false]);

        let source = opu_collection_path("run", 1);
        let err = engine
            .save_opu_collections("run", Some(source.as_path()), |_, _| Ok(()))
            .unwrap_err();
        assert!(matches!(err, Error::IoConflict { .. }));
        Ok(())
    }

    fn dataset() -> impl Strategy<Value = Array2<f64>> {
        (2usize..25, 1usize..4).prop_flat_map(|(n, m)| {
            proptest::collection::vec(0.0f64..10.0, n * m)
                .prop_map(move |v| Array2::from_shape_vec((n, m), v).expect("shape"))
        })
    }

    proptest! {
        #[test]
        fn ranks_are_dense_and_size_ordered(
            intens in dataset(),
            cutoff in 0.0f64..8.0,
            min_size in 0usize..5,
            max_opus in 0usize..4,
        ) {
            let dist = Metric::Euclidean.compute(&intens).unwrap();
            let model = HierarchicalClustering::new().fit(&dist).unwrap();
            let raw: RawClusterLabels = model.cut(cutoff);
            let largest = raw.sizes().into_iter().max().unwrap_or(0);

            match LabelRemap::build(&raw, min_size, max_opus) {
                Ok(remap) => {
                    let sizes = remap.sizes();
                    prop_assert!(!sizes.is_empty());
                    prop_assert_eq!(sizes[0], largest);
                    prop_assert!(sizes.windows(2).all(|w| w[0] >= w[1]));
                    prop_assert!(sizes.iter().all(|&s| s >= min_size));
                    if max_opus > 0 {
                        prop_assert!(remap.len() <= max_opus);
                    }
                    for (rank, id) in remap.iter() {
                        prop_assert_eq!(remap.rank_of(id), Some(rank));
                    }
                    let assigned: Vec<usize> = remap
                        .apply(&raw)
                        .iter()
                        .filter_map(|l| l.rank())
                        .collect();
                    prop_assert!(assigned.iter().all(|&r| r < remap.len()));
                }
                Err(Error::NoCluster { .. }) => prop_assert!(largest < min_size),
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }
        }

        #[test]
        fn cut_matches_cluster_count(intens in dataset(), cutoff in 0.0f64..8.0) {
            let dist = Metric::Euclidean.compute(&intens).unwrap();
            let model = HierarchicalClustering::new().fit(&dist).unwrap();
            let raw = model.cut(cutoff);
            prop_assert_eq!(raw.n_clusters(), model.dendrogram().n_clusters_at(cutoff));
            prop_assert_eq!(raw.labels()[0], 0);
            prop_assert_eq!(raw.sizes().iter().sum::<usize>(), intens.nrows());
        }
    }
}
