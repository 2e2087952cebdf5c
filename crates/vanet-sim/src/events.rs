//! Simulation events, per-tick reports and fleet snapshots.

use serde::{Deserialize, Serialize};
use vanet_cluster::{ClusterChange, ClusterId, Fleet, Role};
use vanet_consensus::{Flagging, TrustLedger};
use vanet_routing::{RouteOutcome, RouterStats};
use vanet_topology::{NodeId, Position, Velocity};

/// Everything observable that happens during a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SimEvent {
    /// First kinematic sample of a vehicle; its trust starts neutral
    NodeAppeared {
        node: NodeId,
        position: Position,
        tick: u64,
    },

    /// A vehicle was removed from the fleet
    NodeDeparted {
        node: NodeId,
        cluster: Option<ClusterId>,
        tick: u64,
    },

    /// A kinematic sample failed its sanity check and was ignored
    UpdateRejected {
        node: NodeId,
        reason: String,
        tick: u64,
    },

    /// Membership, leadership or role change
    Cluster { change: ClusterChange, tick: u64 },

    /// An authority quorum flagged a node
    NodeFlagged { flagging: Flagging, tick: u64 },

    /// A flagged node recovered
    FlagCleared { node: NodeId, trust: f64, tick: u64 },

    /// A message finished routing
    Message { outcome: RouteOutcome, tick: u64 },
}

impl SimEvent {
    /// Tick this event belongs to.
    pub fn tick(&self) -> u64 {
        match self {
            SimEvent::NodeAppeared { tick, .. }
            | SimEvent::NodeDeparted { tick, .. }
            | SimEvent::UpdateRejected { tick, .. }
            | SimEvent::Cluster { tick, .. }
            | SimEvent::NodeFlagged { tick, .. }
            | SimEvent::FlagCleared { tick, .. }
            | SimEvent::Message { tick, .. } => *tick,
        }
    }

    pub fn cluster_change(&self) -> Option<&ClusterChange> {
        match self {
            SimEvent::Cluster { change, .. } => Some(change),
            _ => None,
        }
    }
}

/// Summary of one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: u64,
    pub nodes: usize,
    pub clusters: usize,
    /// Nodes in no cluster after the membership pass
    pub unclustered: usize,
    pub elections: usize,
    pub flagged: usize,
    pub delivered: usize,
    pub dropped: usize,
    /// Messages still queued after delivery
    pub pending_messages: usize,
    pub events: Vec<SimEvent>,
}

impl TickReport {
    pub fn changes(&self) -> impl Iterator<Item = &ClusterChange> {
        self.events.iter().filter_map(SimEvent::cluster_change)
    }

    pub fn routed(&self) -> impl Iterator<Item = &RouteOutcome> {
        self.events.iter().filter_map(|e| match e {
            SimEvent::Message { outcome, .. } => Some(outcome),
            _ => None,
        })
    }
}

/// Counters over a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SimStats {
    pub ticks: u64,
    pub events: u64,
    pub nodes_seen: u64,
    pub departures: u64,
    pub rejected_updates: u64,
    pub clusters_formed: u64,
    pub merges: u64,
    pub splits: u64,
    pub elections: u64,
    pub successions: u64,
    pub flagged: u64,
    pub cleared: u64,
    pub router: RouterStats,
}

impl SimStats {
    /// Cumulative share of finished messages that were delivered.
    pub fn delivery_ratio(&self) -> Option<f64> {
        self.router.delivery_ratio()
    }
}

/// A vehicle in a [`FleetSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub position: Position,
    pub velocity: Velocity,
    pub cluster: Option<ClusterId>,
    pub role: Role,
    pub trust: f64,
    pub malicious: bool,
    /// Trusted enough to sit on its cluster's authority panel
    pub authority: bool,
}

/// A cluster in a [`FleetSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub id: ClusterId,
    pub members: Vec<NodeId>,
    pub leader: Option<NodeId>,
    pub co_leader: Option<NodeId>,
    pub term: u64,
    pub centroid: Position,
    pub radius: f64,
    pub relays: Vec<NodeId>,
    pub unreachable: Vec<NodeId>,
    pub boundaries: Vec<NodeId>,
}

/// Serializable picture of the fleet at the end of a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetSnapshot {
    pub tick: u64,
    pub nodes: Vec<NodeSnapshot>,
    pub clusters: Vec<ClusterSnapshot>,
}

impl FleetSnapshot {
    pub fn capture(tick: u64, fleet: &Fleet, ledger: &TrustLedger, authority_threshold: f64) -> Self {
        let nodes = fleet
            .nodes()
            .iter()
            .map(|node| NodeSnapshot {
                id: node.id,
                position: node.position(),
                velocity: node.state.velocity,
                cluster: node.cluster,
                role: node.role.clone(),
                trust: ledger.score(node.id),
                malicious: ledger.is_malicious(node.id),
                authority: ledger.is_authority(node.id, authority_threshold),
            })
            .collect();

        let clusters = fleet
            .clusters()
            .values()
            .map(|cluster| ClusterSnapshot {
                id: cluster.id,
                members: cluster.members.iter().copied().collect(),
                leader: cluster.leader,
                co_leader: cluster.co_leader,
                term: cluster.term,
                centroid: cluster.centroid,
                radius: cluster.radius,
                relays: cluster.relays.relay_ids().collect(),
                unreachable: cluster.relays.unreachable.iter().copied().collect(),
                boundaries: cluster.boundaries.nodes.keys().copied().collect(),
            })
            .collect();

        Self { tick, nodes, clusters }
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn cluster(&self, id: ClusterId) -> Option<&ClusterSnapshot> {
        self.clusters.iter().find(|c| c.id == id)
    }
}
