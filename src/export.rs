//! Exports of a finished run for downstream writers.
//!
//! - [`write_opu_labels`]: one `name<delim>label` line per sample, `-` for
//!   samples outside every OPU.
//! - [`save_opu_collections`]: one target file per OPU, named by
//!   [`opu_collection_path`]; the caller supplies the dataset writer.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use tracing::debug;

use crate::engine::OpuModel;
use crate::error::{Error, Result};
use crate::remap::OpuLabel;

/// Write one `name<delimiter>label` line per sample.
pub fn write_opu_labels<W, S>(
    writer: W,
    names: &[S],
    labels: &[OpuLabel],
    delimiter: &str,
) -> Result<()>
where
    W: Write,
    S: AsRef<str>,
{
    if names.len() != labels.len() {
        return Err(Error::DimensionMismatch {
            expected: labels.len(),
            found: names.len(),
        });
    }
    let mut out = BufWriter::new(writer);
    for (name, label) in names.iter().zip(labels) {
        writeln!(out, "{}{delimiter}{label}", name.as_ref())?;
    }
    out.flush()?;
    Ok(())
}

/// Target path of OPU `rank` under `prefix`.
///
/// A prefix ending in a path separator is treated as a directory
/// (`dir/OPU_03.txt`); any other prefix is extended (`run1.OPU_03.txt`).
pub fn opu_collection_path(prefix: &str, rank: usize) -> PathBuf {
    let is_dir = prefix.ends_with(MAIN_SEPARATOR) || prefix.ends_with('/');
    if is_dir {
        PathBuf::from(format!("{prefix}OPU_{rank:02}.txt"))
    } else {
        PathBuf::from(format!("{prefix}.OPU_{rank:02}.txt"))
    }
}

/// Whether `a` and `b` name the same file.
///
/// Existing files are compared after canonicalization; otherwise the paths
/// are compared as given.
pub fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Call `write(path, mask)` once per retained OPU, in rank order.
///
/// `mask[i]` is true when sample `i` belongs to the OPU. When `source` is
/// given, a target path naming the source file fails with
/// [`Error::IoConflict`] before anything is written.
pub fn save_opu_collections<F>(
    model: &OpuModel,
    prefix: &str,
    source: Option<&Path>,
    mut write: F,
) -> Result<Vec<PathBuf>>
where
    F: FnMut(&Path, &[bool]) -> Result<()>,
{
    let targets: Vec<(PathBuf, Vec<bool>)> = model
        .unique_opu_labels()
        .into_iter()
        .filter_map(|label| label.rank())
        .map(|rank| (opu_collection_path(prefix, rank), model.opu_mask(rank)))
        .collect();

    if let Some(source) = source {
        if let Some((path, _)) = targets.iter().find(|(p, _)| same_file(p, source)) {
            return Err(Error::IoConflict { path: path.clone() });
        }
    }

    let mut written = Vec::with_capacity(targets.len());
    for (path, mask) in targets {
        debug!(
            path = %path.display(),
            n_members = mask.iter().filter(|&&m| m).count(),
            "writing OPU collection"
        );
        write(&path, &mask)?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_lines() {
        let mut buf = Vec::<u8>::new();
        write_opu_labels(
            &mut buf,
            &["s1", "s2", "s3"],
            &[OpuLabel::Rank(0), OpuLabel::Unassigned, OpuLabel::Rank(12)],
            "\t",
        )
        .unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "s1\t0\ns2\t-\ns3\t12\n");
    }

    #[test]
    fn test_label_length_mismatch() {
        let err = write_opu_labels(Vec::<u8>::new(), &["s1"], &[], ",").unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    #[test]
    fn test_collection_paths() {
        assert_eq!(
            opu_collection_path("out/", 3),
            PathBuf::from("out/OPU_03.txt")
        );
        assert_eq!(
            opu_collection_path("out/run", 12),
            PathBuf::from("out/run.OPU_12.txt")
        );
    }

    #[test]
    fn test_same_file() {
        assert!(same_file(Path::new("a/b.txt"), Path::new("a/b.txt")));
        assert!(!same_file(Path::new("a/b.txt"), Path::new("a/c.txt")));
        let here = std::env::current_dir().unwrap().join("Cargo.toml");
        assert!(same_file(&here, Path::new("Cargo.toml")));
    }
}
