//! Error taxonomy for the OPU clustering pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::engine::Stage;

/// Result alias for `opu_hca`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the clustering engine and its components.
#[derive(Debug, Error)]
pub enum Error {
    /// Input was empty.
    #[error("empty input provided")]
    EmptyInput,

    /// Matrix or list dimension mismatch.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Found dimension.
        found: usize,
    },

    /// Input data violates a structural requirement.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Unknown registry key or out-of-range configuration value.
    #[error("invalid configuration for '{name}': {message}")]
    Configuration {
        /// Configuration item.
        name: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// A derived property was requested before the run reached `Ready`.
    #[error("clustering is not ready: engine is at stage '{stage}', missing step '{missing}'; call run() first")]
    NotReady {
        /// Stage the engine has reached.
        stage: Stage,
        /// First stage that has not completed.
        missing: Stage,
    },

    /// The engine already holds a finalized model.
    #[error("clustering has already run; call reset() before running with a new configuration")]
    AlreadyRun,

    /// Every raw cluster fell below the minimum OPU size.
    #[error("no OPU found since all {n_clusters} clusters are below the size threshold of {min_size} (largest has {largest}); try lowering the minimum OPU size")]
    NoCluster {
        /// Resolved minimum size.
        min_size: usize,
        /// Size of the largest raw cluster.
        largest: usize,
        /// Number of raw clusters examined.
        n_clusters: usize,
    },

    /// An export would overwrite its own source file.
    #[error("output '{}' is the source file; refusing to overwrite it", .path.display())]
    IoConflict {
        /// Conflicting path.
        path: PathBuf,
    },

    /// I/O failure while exporting.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn config(name: &'static str, message: impl Into<String>) -> Self {
        Error::Configuration {
            name,
            message: message.into(),
        }
    }
}
