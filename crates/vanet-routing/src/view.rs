//! What the router needs to know about the fleet.

use vanet_cluster::{ClusterId, Fleet};
use vanet_consensus::TrustLedger;
use vanet_topology::{NeighborTable, NodeId};

/// Read-only topology and role view for one delivery phase.
pub trait RoutingView {
    /// Whether the node is currently in the fleet.
    fn contains(&self, node: NodeId) -> bool;

    /// Members of a cluster, `None` if it does not exist.
    fn members(&self, cluster: ClusterId) -> Option<Vec<NodeId>>;

    /// Direct radio neighbours.
    fn neighbors(&self, node: NodeId) -> &[NodeId];

    /// Whether the node may carry traffic for others.
    fn can_forward(&self, node: NodeId) -> bool;
}

/// [`RoutingView`] over a fleet at the end of a tick's role refresh.
///
/// Leaders, co-leaders, relays and boundary nodes forward; flagged nodes never do.
#[derive(Debug, Clone, Copy)]
pub struct FleetView<'a> {
    fleet: &'a Fleet,
    table: &'a NeighborTable,
    ledger: &'a TrustLedger,
}

impl<'a> FleetView<'a> {
    pub fn new(fleet: &'a Fleet, table: &'a NeighborTable, ledger: &'a TrustLedger) -> Self {
        Self {
            fleet,
            table,
            ledger,
        }
    }
}

impl RoutingView for FleetView<'_> {
    fn contains(&self, node: NodeId) -> bool {
        self.fleet.nodes().contains(node)
    }

    fn members(&self, cluster: ClusterId) -> Option<Vec<NodeId>> {
        self.fleet
            .cluster(cluster)
            .map(|c| c.members.iter().copied().collect())
    }

    fn neighbors(&self, node: NodeId) -> &[NodeId] {
        self.table.neighbors(node)
    }

    fn can_forward(&self, node: NodeId) -> bool {
        !self.ledger.is_malicious(node)
            && self.fleet.node(node).is_some_and(|n| n.role.forwards())
    }
}
