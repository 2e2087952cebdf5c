//! Error types for vanet-consensus.

use thiserror::Error;

/// Result type for consensus configuration.
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration errors. Runtime outcomes (no candidates, no quorum) are not
/// errors and are reported through return values instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A weight set does not sum to 1.0.
    #[error("{set} weights sum to {sum:.4}, expected 1.0")]
    WeightSum { set: &'static str, sum: f64 },

    /// A single weight is negative or not finite.
    #[error("{set} weight {value} is out of range")]
    WeightOutOfRange { set: &'static str, value: f64 },

    /// A threshold or fraction lies outside [0, 1].
    #[error("{name} must be within [0, 1], got {value}")]
    OutOfUnitRange { name: &'static str, value: f64 },

    /// A limit that must be strictly positive is not.
    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },
}
