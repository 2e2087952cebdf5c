//! Error types for vanet-sim.

use std::path::PathBuf;

use thiserror::Error;
use vanet_topology::NodeId;

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while configuring or driving a simulation.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid JSON for [`crate::SimConfig`].
    #[error("invalid config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// An environment override could not be parsed.
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("invalid simulation parameter {name}: {reason}")]
    Parameter { name: &'static str, reason: &'static str },

    /// Message submitted on behalf of a node the fleet does not know.
    #[error("unknown sender {0}")]
    UnknownSender(NodeId),

    #[error(transparent)]
    Topology(#[from] vanet_topology::Error),

    #[error(transparent)]
    Consensus(#[from] vanet_consensus::Error),

    #[error(transparent)]
    Cluster(#[from] vanet_cluster::Error),

    #[error(transparent)]
    Routing(#[from] vanet_routing::Error),
}
