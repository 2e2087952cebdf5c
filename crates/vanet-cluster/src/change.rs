//! Changes reported by the cluster manager, one per state transition.

use serde::{Deserialize, Serialize};
use vanet_consensus::ElectionRecord;
use vanet_topology::NodeId;

use crate::cluster::ClusterId;

/// Why a node left its cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveReason {
    /// The node left the fleet
    Departed,
    /// Speed or heading no longer matches the cluster
    Incompatible,
    /// Evicted to restore the radius bound
    OutOfRange,
    /// Evicted to restore the size bound
    Overflow,
}

/// A cluster state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClusterChange {
    Formed {
        cluster: ClusterId,
        members: Vec<NodeId>,
    },

    Joined {
        cluster: ClusterId,
        node: NodeId,
    },

    Left {
        cluster: ClusterId,
        node: NodeId,
        reason: LeaveReason,
    },

    /// `absorbed` no longer exists; its members now belong to `into`
    Merged {
        into: ClusterId,
        absorbed: ClusterId,
        size: usize,
    },

    /// `moved` members left `from` to form `into`
    Split {
        from: ClusterId,
        into: ClusterId,
        moved: Vec<NodeId>,
    },

    Dissolved {
        cluster: ClusterId,
        released: Vec<NodeId>,
    },

    /// The co-leader took over without an election
    LeaderSucceeded {
        cluster: ClusterId,
        previous: Option<NodeId>,
        leader: NodeId,
    },

    /// Leader lost with no co-leader standing by
    LeaderVacant {
        cluster: ClusterId,
        previous: Option<NodeId>,
    },

    ElectionHeld {
        cluster: ClusterId,
        record: ElectionRecord,
    },

    /// Election found no eligible candidate; retried once the electorate changes
    Leaderless {
        cluster: ClusterId,
        term: u64,
    },

    RelaysUpdated {
        cluster: ClusterId,
        relays: Vec<NodeId>,
        unreachable: Vec<NodeId>,
    },

    BoundariesUpdated {
        cluster: ClusterId,
        boundaries: Vec<NodeId>,
        gaps: Vec<ClusterId>,
    },
}

impl ClusterChange {
    /// The cluster this change is about.
    pub fn cluster(&self) -> ClusterId {
        match self {
            ClusterChange::Formed { cluster, .. }
            | ClusterChange::Joined { cluster, .. }
            | ClusterChange::Left { cluster, .. }
            | ClusterChange::Dissolved { cluster, .. }
            | ClusterChange::LeaderSucceeded { cluster, .. }
            | ClusterChange::LeaderVacant { cluster, .. }
            | ClusterChange::ElectionHeld { cluster, .. }
            | ClusterChange::Leaderless { cluster, .. }
            | ClusterChange::RelaysUpdated { cluster, .. }
            | ClusterChange::BoundariesUpdated { cluster, .. } => *cluster,
            ClusterChange::Merged { into, .. } => *into,
            ClusterChange::Split { from, .. } => *from,
        }
    }
}
