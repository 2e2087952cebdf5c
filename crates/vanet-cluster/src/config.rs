//! Cluster formation parameters.

use serde::{Deserialize, Serialize};
use vanet_consensus::{validate_positive, ElectionWeights};
use vanet_topology::DEFAULT_DSRC_RANGE;

use crate::boundary::BoundaryWeights;
use crate::error::{Error, Result};
use crate::relay::RelayWeights;

/// Everything the cluster manager and the role electors are tuned by.
///
/// Distances are in metres, speeds in metres per tick, angles in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Upper bound on distance between members and on cluster radius
    pub max_cluster_radius: f64,
    /// Largest speed difference for two vehicles to share a cluster
    pub speed_threshold: f64,
    /// Largest heading difference for two vehicles to share a cluster
    pub direction_threshold: f64,
    pub min_cluster_size: usize,
    pub max_cluster_size: usize,
    /// Minimum ticks between merge or split decisions for one cluster
    pub reshape_cooldown: u64,
    /// Direct V2V radio range
    pub dsrc_range: f64,
    /// Range within which a member sees another cluster's members
    pub boundary_detection_range: f64,
    /// Ticks of centroid offsets kept per node for stability
    pub history_window: usize,
    pub election_weights: ElectionWeights,
    pub relay_weights: RelayWeights,
    pub boundary_weights: BoundaryWeights,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            max_cluster_radius: 150.0,
            speed_threshold: 5.0,
            direction_threshold: 30.0,
            min_cluster_size: 2,
            max_cluster_size: 10,
            reshape_cooldown: 5,
            dsrc_range: DEFAULT_DSRC_RANGE,
            boundary_detection_range: DEFAULT_DSRC_RANGE,
            history_window: 8,
            election_weights: ElectionWeights::default(),
            relay_weights: RelayWeights::default(),
            boundary_weights: BoundaryWeights::default(),
        }
    }
}

impl ClusterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_cluster_size == 0 || self.min_cluster_size > self.max_cluster_size {
            return Err(Error::SizeBounds {
                min: self.min_cluster_size,
                max: self.max_cluster_size,
            });
        }
        validate_positive("max_cluster_radius", self.max_cluster_radius)?;
        validate_positive("speed_threshold", self.speed_threshold)?;
        validate_positive("direction_threshold", self.direction_threshold)?;
        validate_positive("dsrc_range", self.dsrc_range)?;
        validate_positive("boundary_detection_range", self.boundary_detection_range)?;
        validate_positive("history_window", self.history_window as f64)?;
        self.election_weights.validate()?;
        self.relay_weights.validate()?;
        self.boundary_weights.validate()?;
        Ok(())
    }
}
