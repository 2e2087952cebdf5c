//! Error types for vanet-topology.

use thiserror::Error;

use crate::NodeId;

/// Result type for topology operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while sanity-checking the kinematic feed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Position or velocity contains NaN or infinity.
    #[error("non-finite kinematic state for {node}")]
    NonFinite { node: NodeId },

    /// Reported speed is beyond the physical bound.
    #[error("implausible speed {speed:.2} for {node} (max {max:.2})")]
    ImplausibleSpeed { node: NodeId, speed: f64, max: f64 },
}
