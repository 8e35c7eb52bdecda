use opu_hca::{CutoffSpec, Linkage, MinClusterSize, OpuClusteringEngine, OpuConfig};

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Three synthetic "phenotypes": Gaussian bands at different positions,
    // plus a few outlier spectra. Each phenotype gets its own sample count so
    // the OPU ranks are easy to read off.
    let n_channels = 64;
    let phenotypes = [(12.0, 14), (30.0, 9), (48.0, 5)];
    let n_outliers = 3;

    let mut rng = StdRng::seed_from_u64(7);
    let mut rows: Vec<f64> = Vec::new();
    let mut names: Vec<String> = Vec::new();

    for (p, &(center, count)) in phenotypes.iter().enumerate() {
        for i in 0..count {
            let shift: f64 = rng.random_range(-1.0..1.0);
            for c in 0..n_channels {
                let x = c as f64 - (center + shift);
                let band = (-x * x / 18.0).exp();
                rows.push(band + rng.random_range(-0.02..0.02));
            }
            names.push(format!("pheno{p}_cell{i:02}"));
        }
    }
    for i in 0..n_outliers {
        for _ in 0..n_channels {
            rows.push(rng.random_range(0.0..0.6));
        }
        names.push(format!("outlier{i}"));
    }

    let n_samples = names.len();
    let intens = Array2::from_shape_vec((n_samples, n_channels), rows)?;
    let mut engine = OpuClusteringEngine::new(intens, names)?;

    let config = OpuConfig::new()
        .with_cutoff(CutoffSpec::Bic)
        .with_linkage(Linkage::Average)
        .with_min_opu_size(MinClusterSize::Count(2));
    let model = engine.run(&config)?;

    println!("{}", model.summary());
    println!("OPU sizes: {:?}", model.cluster_sizes());
    println!("leaf order: {:?}", model.leaf_order());

    let mut out = Vec::<u8>::new();
    engine.write_opu_labels(&mut out)?;
    print!("{}", String::from_utf8(out)?);

    let paths = engine.save_opu_collections("demo/", None, |path, mask| {
        let members = mask.iter().filter(|&&m| m).count();
        println!("would write {members} spectra to {}", path.display());
        Ok(())
    })?;
    println!("{} collections", paths.len());

    Ok(())
}
