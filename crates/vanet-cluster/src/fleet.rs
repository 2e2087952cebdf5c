//! The fleet: node arena plus clusters holding id sets.

use std::collections::BTreeMap;

use vanet_topology::{KinematicUpdate, NeighborTable, NodeId};

use crate::cluster::{Cluster, ClusterId};
use crate::node::{Node, NodeArena, Role};

/// All nodes and clusters of one run.
#[derive(Debug, Clone, Default)]
pub struct Fleet {
    pub(crate) nodes: NodeArena,
    pub(crate) clusters: BTreeMap<ClusterId, Cluster>,
    next_cluster: u64,
}

impl Fleet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &NodeArena {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn clusters(&self) -> &BTreeMap<ClusterId, Cluster> {
        &self.clusters
    }

    pub fn cluster(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(&id)
    }

    /// The cluster a node belongs to.
    pub fn cluster_of(&self, node: NodeId) -> Option<&Cluster> {
        self.nodes
            .get(node)
            .and_then(|n| n.cluster)
            .and_then(|c| self.clusters.get(&c))
    }

    /// Apply one kinematic sample. Returns true for a node seen for the first time.
    pub fn observe(&mut self, update: &KinematicUpdate, tick: u64) -> bool {
        match self.nodes.get_mut(update.node) {
            Some(node) => {
                node.observe(update.state);
                false
            }
            None => {
                self.nodes.insert(Node::new(update.node, update.state, tick));
                true
            }
        }
    }

    /// Remove a node from the fleet and from its cluster.
    ///
    /// Leadership it held is vacated; succession happens in the next
    /// leadership pass.
    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(id)?;
        if let Some(cluster) = node.cluster.and_then(|c| self.clusters.get_mut(&c)) {
            cluster.remove_member(id);
        }
        Some(node)
    }

    /// Strip a flagged node of relay and boundary duties immediately.
    ///
    /// Leader and co-leader slots are reclaimed by the leadership pass.
    pub fn demote(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        node.role = Role::Member;
        if let Some(cluster) = node.cluster.and_then(|c| self.clusters.get_mut(&c)) {
            cluster.relays.forget(id);
            cluster.boundaries.forget(id);
        }
    }

    /// Radio adjacency of every node at its current position.
    pub fn neighbor_table(&self, range: f64) -> NeighborTable {
        NeighborTable::build(self.nodes.iter().map(|n| (n.id, n.position())), range)
    }

    pub(crate) fn allocate_cluster_id(&mut self) -> ClusterId {
        self.next_cluster += 1;
        ClusterId(self.next_cluster)
    }

    /// Move a node out of its cluster.
    pub(crate) fn detach(&mut self, id: NodeId) -> Option<ClusterId> {
        let node = self.nodes.get_mut(id)?;
        let cluster = node.cluster?;
        node.leave();
        if let Some(c) = self.clusters.get_mut(&cluster) {
            c.remove_member(id);
        }
        Some(cluster)
    }

    /// Recompute derived geometry of every cluster.
    pub(crate) fn refresh_clusters(&mut self) {
        for cluster in self.clusters.values_mut() {
            cluster.refresh(&self.nodes);
        }
    }

    /// Push each member's offset from its cluster centroid into its history.
    pub(crate) fn record_history(&mut self, window: usize) {
        for cluster in self.clusters.values() {
            for &m in &cluster.members {
                if let Some(node) = self.nodes.get_mut(m) {
                    node.record_offset(cluster.centroid, window);
                }
            }
        }
    }

    /// Derive every node's role from its cluster's elected sets.
    pub(crate) fn assign_roles(&mut self) {
        for node in self.nodes.iter_mut() {
            node.role = match node.cluster.and_then(|c| self.clusters.get(&c)) {
                None => Role::Member,
                Some(cluster) if cluster.leader == Some(node.id) => Role::Leader,
                Some(cluster) if cluster.co_leader == Some(node.id) => Role::CoLeader,
                Some(cluster) => {
                    if let Some(covers) = cluster.relays.relays.get(&node.id) {
                        Role::Relay {
                            covers: covers.clone(),
                        }
                    } else if let Some(toward) = cluster.boundaries.nodes.get(&node.id) {
                        Role::Boundary {
                            toward: toward.clone(),
                        }
                    } else {
                        Role::Member
                    }
                }
            };
        }
    }

    /// Members per cluster.
    pub fn cluster_sizes(&self) -> impl Iterator<Item = (ClusterId, usize)> + '_ {
        self.clusters.iter().map(|(&id, c)| (id, c.len()))
    }
}
