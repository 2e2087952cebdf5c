//! VANET Topology
//!
//! Geometry and radio adjacency for a fleet of vehicles.
//!
//! # Frame
//!
//! Vehicles move in a flat local frame measured in metres, with velocities
//! in metres per tick. Kinematic state arrives every tick from an external
//! mobility model and is only sanity-checked here.
//!
//! # Adjacency
//!
//! Two vehicles can talk directly when they are within DSRC range. Every
//! phase of a tick reads the same [`NeighborTable`], built once from the
//! tick's position snapshot, so no phase observes a half-updated topology.

mod error;
mod geometry;
mod kinematics;
mod neighbors;

pub use error::{Error, Result};
pub use geometry::{heading_difference, normalize_heading, Position, Velocity, FULL_TURN};
pub use kinematics::{KinematicState, KinematicUpdate, NodeId};
pub use neighbors::{centroid, farthest_pair, radius, within_range, NeighborTable};

/// Nominal DSRC radio range in metres.
pub const DEFAULT_DSRC_RANGE: f64 = 300.0;

/// Physical speed bound for the sanity check (metres per tick, ~250 km/h at 1 s ticks).
pub const DEFAULT_MAX_SPEED: f64 = 70.0;
