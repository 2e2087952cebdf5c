//! Per-cluster state.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use vanet_consensus::ElectionRecord;
use vanet_topology::{centroid, radius, NodeId, Position, Velocity};

use crate::boundary::BoundarySet;
use crate::node::NodeArena;
use crate::relay::{RelayBasis, RelaySet};

/// Stable identifier of a cluster. Never reused within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterId(pub u64);

impl std::fmt::Display for ClusterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// A cluster and everything elected within it.
///
/// Members are held by id; node state lives in the [`NodeArena`].
#[derive(Debug, Clone)]
pub struct Cluster {
    pub id: ClusterId,
    pub members: BTreeSet<NodeId>,
    pub leader: Option<NodeId>,
    /// Always distinct from the leader
    pub co_leader: Option<NodeId>,
    pub centroid: Position,
    pub radius: f64,
    /// Mean member velocity
    pub heading: Velocity,
    pub formed_at: u64,
    /// Incremented on every election
    pub term: u64,
    /// Tick of the latest merge or split involving this cluster
    pub last_reshape: u64,
    pub election_pending: bool,
    pub last_election: Option<ElectionRecord>,
    pub relays: RelaySet,
    pub boundaries: BoundarySet,
    pub(crate) relay_basis: Option<RelayBasis>,
    /// Electorate of the last election that found no leader
    pub(crate) failed_electorate: Option<BTreeSet<NodeId>>,
}

impl Cluster {
    /// A freshly formed cluster awaiting its first election.
    pub fn new(id: ClusterId, members: BTreeSet<NodeId>, tick: u64) -> Self {
        Self {
            id,
            members,
            leader: None,
            co_leader: None,
            centroid: Position::ORIGIN,
            radius: 0.0,
            heading: Velocity::ZERO,
            formed_at: tick,
            term: 0,
            last_reshape: tick,
            election_pending: true,
            last_election: None,
            relays: RelaySet::default(),
            boundaries: BoundarySet::default(),
            relay_basis: None,
            failed_electorate: None,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.members.contains(&node)
    }

    /// Ticks since formation.
    pub fn age(&self, tick: u64) -> u64 {
        tick.saturating_sub(self.formed_at)
    }

    /// Whether a merge or split may be decided at `tick`.
    pub fn can_reshape(&self, tick: u64, cooldown: u64) -> bool {
        tick.saturating_sub(self.last_reshape) >= cooldown
    }

    /// Recompute centroid, radius and mean velocity from member positions.
    pub fn refresh(&mut self, nodes: &NodeArena) {
        let positions: Vec<Position> = self.members.iter().filter_map(|&m| nodes.position(m)).collect();
        self.centroid = centroid(positions.iter().copied()).unwrap_or(Position::ORIGIN);
        self.radius = radius(positions.iter().copied(), self.centroid);

        let velocities: Vec<Velocity> = self
            .members
            .iter()
            .filter_map(|&m| nodes.get(m).map(|n| n.state.velocity))
            .collect();
        self.heading = if velocities.is_empty() {
            Velocity::ZERO
        } else {
            let sum = velocities.iter().fold(Velocity::ZERO, |acc, &v| acc + v);
            sum * (1.0 / velocities.len() as f64)
        };
    }

    /// Drop a member and any role it held.
    pub(crate) fn remove_member(&mut self, node: NodeId) -> bool {
        if !self.members.remove(&node) {
            return false;
        }
        if self.leader == Some(node) {
            self.leader = None;
        }
        if self.co_leader == Some(node) {
            self.co_leader = None;
        }
        self.relays.forget(node);
        self.boundaries.forget(node);
        true
    }

    /// Demote everyone and schedule an election.
    pub(crate) fn reset_leadership(&mut self) {
        self.leader = None;
        self.co_leader = None;
        self.election_pending = true;
        self.relays = RelaySet::default();
        self.boundaries = BoundarySet::default();
        self.relay_basis = None;
        self.failed_electorate = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use vanet_topology::KinematicState;

    fn arena(points: &[(u64, f64, f64)]) -> NodeArena {
        let mut nodes = NodeArena::new();
        for &(id, x, vx) in points {
            nodes.insert(Node::new(
                NodeId(id),
                KinematicState::new(Position::new(x, 0.0), Velocity::new(vx, 0.0)),
                0,
            ));
        }
        nodes
    }

    #[test]
    fn refresh_derives_geometry() {
        let nodes = arena(&[(1, 0.0, 20.0), (2, 100.0, 22.0)]);
        let mut cluster = Cluster::new(ClusterId(1), [NodeId(1), NodeId(2)].into(), 0);
        cluster.refresh(&nodes);
        assert_eq!(cluster.centroid, Position::new(50.0, 0.0));
        assert_eq!(cluster.radius, 50.0);
        assert!((cluster.heading.vx - 21.0).abs() < 1e-12);
    }

    #[test]
    fn removing_leader_clears_role() {
        let mut cluster = Cluster::new(ClusterId(1), [NodeId(1), NodeId(2)].into(), 0);
        cluster.leader = Some(NodeId(1));
        cluster.co_leader = Some(NodeId(2));
        assert!(cluster.remove_member(NodeId(1)));
        assert_eq!(cluster.leader, None);
        assert_eq!(cluster.co_leader, Some(NodeId(2)));
        assert!(!cluster.remove_member(NodeId(1)));
    }

    #[test]
    fn cooldown_gates_reshaping() {
        let cluster = Cluster::new(ClusterId(1), BTreeSet::new(), 10);
        assert!(!cluster.can_reshape(12, 5));
        assert!(cluster.can_reshape(15, 5));
    }
}
