//! Node arena and per-node role state.

use std::collections::{btree_map, BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use vanet_topology::{KinematicState, NodeId, Position};

use crate::cluster::ClusterId;

/// What a node does for its cluster this tick.
///
/// A node holds exactly one role. When it is selected for several duties the
/// highest takes precedence: leader, co-leader, relay, boundary, member. The
/// cluster's relay and boundary sets still list it for every duty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Role {
    #[default]
    Member,
    Leader,
    CoLeader,
    /// Forwards for out-of-range members
    Relay { covers: BTreeSet<NodeId> },
    /// Forwards toward adjacent clusters
    Boundary { toward: BTreeSet<ClusterId> },
}

impl Role {
    /// Leaders, co-leaders, relays and boundary nodes forward traffic.
    pub fn forwards(&self) -> bool {
        !matches!(self, Role::Member)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Leader => "leader",
            Role::CoLeader => "co_leader",
            Role::Relay { .. } => "relay",
            Role::Boundary { .. } => "boundary",
        }
    }
}

/// A vehicle as seen by the coordination core.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub state: KinematicState,
    /// State at the previous tick, for anomaly features
    pub previous: Option<KinematicState>,
    pub cluster: Option<ClusterId>,
    pub role: Role,
    /// Tick this node joined its current cluster
    pub joined_at: u64,
    /// Tick this node first appeared
    pub first_seen: u64,
    /// Recent offsets from the cluster centroid, newest last
    offsets: VecDeque<Position>,
}

impl Node {
    pub fn new(id: NodeId, state: KinematicState, tick: u64) -> Self {
        Self {
            id,
            state,
            previous: None,
            cluster: None,
            role: Role::Member,
            joined_at: tick,
            first_seen: tick,
            offsets: VecDeque::new(),
        }
    }

    pub fn position(&self) -> Position {
        self.state.position
    }

    /// Ticks spent in the current cluster.
    pub fn tenure(&self, tick: u64) -> u64 {
        match self.cluster {
            Some(_) => tick.saturating_sub(self.joined_at),
            None => 0,
        }
    }

    /// Accept a new kinematic sample.
    pub(crate) fn observe(&mut self, state: KinematicState) {
        self.previous = Some(self.state);
        self.state = state;
    }

    /// Enter a cluster. Stability history restarts.
    pub(crate) fn join(&mut self, cluster: ClusterId, tick: u64) {
        self.cluster = Some(cluster);
        self.joined_at = tick;
        self.role = Role::Member;
        self.offsets.clear();
    }

    /// Leave the current cluster.
    pub(crate) fn leave(&mut self) {
        self.cluster = None;
        self.role = Role::Member;
        self.offsets.clear();
    }

    /// Record this tick's offset from the cluster centroid.
    pub(crate) fn record_offset(&mut self, centroid: Position, window: usize) {
        self.offsets.push_back(self.state.position - centroid);
        while self.offsets.len() > window.max(1) {
            self.offsets.pop_front();
        }
    }

    /// Variance of the recent centroid offsets (m²). Zero with fewer than two samples.
    pub fn position_variance(&self) -> f64 {
        let n = self.offsets.len();
        if n < 2 {
            return 0.0;
        }
        let (sx, sy) = self
            .offsets
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        let mean = Position::new(sx / n as f64, sy / n as f64);
        self.offsets.iter().map(|p| p.distance_squared(&mean)).sum::<f64>() / n as f64
    }

    /// Stability in (0, 1]: 1 for a node holding its place in the cluster.
    pub fn stability(&self) -> f64 {
        1.0 / (1.0 + self.position_variance())
    }
}

/// All live nodes, indexed by stable identifier.
#[derive(Debug, Clone, Default)]
pub struct NodeArena {
    nodes: BTreeMap<NodeId, Node>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Insert a node, replacing any previous entry with the same id.
    pub fn insert(&mut self, node: Node) -> Option<Node> {
        self.nodes.insert(node.id, node)
    }

    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        self.nodes.remove(&id)
    }

    pub fn position(&self, id: NodeId) -> Option<Position> {
        self.nodes.get(&id).map(Node::position)
    }

    /// Nodes in id order.
    pub fn iter(&self) -> btree_map::Values<'_, NodeId, Node> {
        self.nodes.values()
    }

    pub fn iter_mut(&mut self) -> btree_map::ValuesMut<'_, NodeId, Node> {
        self.nodes.values_mut()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Nodes not in any cluster, in id order.
    pub fn unclustered(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|n| n.cluster.is_none())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vanet_topology::Velocity;

    fn node_at(id: u64, x: f64) -> Node {
        Node::new(
            NodeId(id),
            KinematicState::new(Position::new(x, 0.0), Velocity::new(20.0, 0.0)),
            0,
        )
    }

    #[test]
    fn variance_of_steady_offset_is_zero() {
        let mut node = node_at(1, 10.0);
        for _ in 0..5 {
            node.record_offset(Position::ORIGIN, 8);
        }
        assert_eq!(node.position_variance(), 0.0);
        assert_eq!(node.stability(), 1.0);
    }

    #[test]
    fn variance_grows_with_drift() {
        let mut node = node_at(1, 0.0);
        for i in 0..4 {
            node.record_offset(Position::new(-(i as f64) * 2.0, 0.0), 8);
        }
        // Offsets 0, 2, 4, 6: variance 5
        assert!((node.position_variance() - 5.0).abs() < 1e-12);
        assert!(node.stability() < 1.0);
    }

    #[test]
    fn history_window_is_bounded() {
        let mut node = node_at(1, 0.0);
        for i in 0..20 {
            node.record_offset(Position::new(i as f64, 0.0), 3);
        }
        assert_eq!(node.offsets.len(), 3);
    }

    #[test]
    fn joining_resets_tenure_and_history() {
        let mut node = node_at(1, 0.0);
        node.join(ClusterId(1), 5);
        node.record_offset(Position::new(3.0, 0.0), 8);
        node.record_offset(Position::new(7.0, 0.0), 8);
        assert_eq!(node.tenure(9), 4);

        node.join(ClusterId(2), 10);
        assert_eq!(node.tenure(10), 0);
        assert_eq!(node.position_variance(), 0.0);

        node.leave();
        assert_eq!(node.tenure(20), 0);
    }

    #[test]
    fn only_members_do_not_forward() {
        assert!(!Role::Member.forwards());
        assert!(Role::Leader.forwards());
        assert!(Role::Boundary {
            toward: BTreeSet::new()
        }
        .forwards());
    }

    #[test]
    fn role_serializes_with_tag() {
        let role = Role::Relay {
            covers: [NodeId(4)].into_iter().collect(),
        };
        let json = serde_json::to_string(&role).unwrap();
        assert!(json.contains("\"role\":\"relay\""));
        let parsed: Role = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, role);
    }

    #[test]
    fn arena_iterates_in_id_order() {
        let mut arena = NodeArena::new();
        for id in [5, 1, 3] {
            arena.insert(node_at(id, id as f64));
        }
        let ids: Vec<_> = arena.ids().collect();
        assert_eq!(ids, vec![NodeId(1), NodeId(3), NodeId(5)]);
        assert_eq!(arena.unclustered().count(), 3);
    }
}
