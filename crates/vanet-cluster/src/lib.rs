//! VANET Cluster Lifecycle
//!
//! Vehicles moving together are grouped into clusters. Each cluster elects a
//! leader and a standing co-leader, relays for members beyond the leader's
//! radio range, and boundary nodes toward neighbouring clusters.
//!
//! # Ownership
//!
//! Nodes live in a [`NodeArena`] indexed by [`NodeId`]; clusters hold id
//! sets. Nothing points back from a node to its cluster except the
//! [`ClusterId`] it carries, so the two can be mutated independently in each
//! phase.
//!
//! # Phases
//!
//! [`ClusterManager`] exposes the three phases of a tick this crate owns:
//!
//! - [`ClusterManager::update_membership`]: formation, merge, split, dissolve
//! - [`ClusterManager::resolve_leadership`]: succession and failure-driven elections
//! - [`ClusterManager::refresh_roles`]: relays, boundaries and per-node roles
//!
//! Suspicion and trust updates run between the first two and are owned by
//! `vanet-consensus`.

mod change;
mod cluster;
mod config;
mod error;
mod fleet;
mod manager;
mod node;

pub mod boundary;
pub mod relay;

pub use boundary::{BoundaryElector, BoundarySet, BoundaryWeights};
pub use change::{ClusterChange, LeaveReason};
pub use cluster::{Cluster, ClusterId};
pub use config::ClusterConfig;
pub use error::{Error, Result};
pub use fleet::Fleet;
pub use manager::ClusterManager;
pub use node::{Node, NodeArena, Role};
pub use relay::{RelayElector, RelaySet, RelayWeights};

pub use vanet_topology::NodeId;
