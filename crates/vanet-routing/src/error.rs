//! Error types for vanet-routing.

use thiserror::Error;

/// Result type for vanet-routing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Ingress and configuration errors. Delivery failures are reported as
/// [`crate::DropReason`] values, never as errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A message was submitted with no hop budget.
    #[error("message from {sender} has a zero time-to-live")]
    ZeroTtl { sender: vanet_topology::NodeId },

    /// Payload exceeds the configured limit.
    #[error("payload of {len} bytes exceeds limit of {max}")]
    PayloadTooLarge { len: usize, max: usize },

    /// A router limit is zero.
    #[error("router {0} must be positive")]
    ZeroLimit(&'static str),
}
