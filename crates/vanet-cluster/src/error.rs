//! Error types for vanet-cluster.

use thiserror::Error;

/// Result type for vanet-cluster operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration errors. Runtime degenerate cases (empty clusters, no
/// eligible candidates, uncoverable members) are reported as changes, not errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Cluster size bounds are inverted or zero.
    #[error("invalid cluster size bounds: min {min}, max {max}")]
    SizeBounds { min: usize, max: usize },

    /// A scoring or threshold parameter is invalid.
    #[error(transparent)]
    Parameter(#[from] vanet_consensus::Error),
}
