//! Node identity and kinematic state as delivered by the mobility feed.
//!
//! The mobility model is an external collaborator. The only validation
//! applied here is a sanity check: components must be finite and the speed
//! must not exceed a configured physical bound.

use crate::error::{Error, Result};
use crate::geometry::{heading_difference, Position, Velocity};

/// Stable identifier of a vehicle.
///
/// Ordering matters: election ties resolve to the lowest identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Position and velocity of a vehicle at one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KinematicState {
    pub position: Position,
    pub velocity: Velocity,
}

impl KinematicState {
    pub const fn new(position: Position, velocity: Velocity) -> Self {
        Self { position, velocity }
    }

    pub fn speed(&self) -> f64 {
        self.velocity.speed()
    }

    pub fn heading(&self) -> f64 {
        self.velocity.heading()
    }

    /// Absolute speed difference to another vehicle.
    pub fn speed_difference(&self, other: &Self) -> f64 {
        (self.speed() - other.speed()).abs()
    }

    /// Smallest heading difference to another vehicle, in degrees.
    pub fn heading_difference(&self, other: &Self) -> f64 {
        heading_difference(self.heading(), other.heading())
    }

    /// Where this vehicle is expected to be after `dt` ticks.
    pub fn predict(&self, dt: f64) -> Position {
        self.position.advance(self.velocity, dt)
    }
}

/// One entry of the per-tick kinematic feed.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KinematicUpdate {
    pub node: NodeId,
    pub state: KinematicState,
}

impl KinematicUpdate {
    pub const fn new(node: NodeId, state: KinematicState) -> Self {
        Self { node, state }
    }

    /// Range and type sanity check.
    pub fn validate(&self, max_speed: f64) -> Result<()> {
        if !self.state.position.is_finite() || !self.state.velocity.is_finite() {
            return Err(Error::NonFinite { node: self.node });
        }
        let speed = self.state.speed();
        if speed > max_speed {
            return Err(Error::ImplausibleSpeed {
                node: self.node,
                speed,
                max: max_speed,
            });
        }
        Ok(())
    }
}
