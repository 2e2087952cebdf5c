//! Boundary election between neighbouring clusters.
//!
//! Two clusters are mutually visible when any member of one is within the
//! boundary detection range of any member of the other. Range is symmetric,
//! so visibility is too. For every visible pair each side selects its best
//! eligible member by
//!
//! `0.40·trust + 0.35·edge proximity + 0.25·connectivity`
//!
//! Edge proximity is the distance from the own centroid relative to the
//! cluster radius; connectivity is how many members of the other cluster the
//! candidate sees, relative to the best candidate. A side with no eligible
//! candidate records a gap toward that cluster.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;
use vanet_consensus::{validate_weight_set, Result, TrustLedger};
use vanet_topology::{within_range, NodeId};

use crate::cluster::{Cluster, ClusterId};
use crate::node::NodeArena;

/// Weights of the boundary score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundaryWeights {
    pub trust: f64,
    pub edge_proximity: f64,
    pub connectivity: f64,
}

impl Default for BoundaryWeights {
    fn default() -> Self {
        Self {
            trust: 0.40,
            edge_proximity: 0.35,
            connectivity: 0.25,
        }
    }
}

impl BoundaryWeights {
    pub fn validate(&self) -> Result<()> {
        validate_weight_set("boundary", &[self.trust, self.edge_proximity, self.connectivity])
    }
}

/// Boundary nodes of one cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundarySet {
    /// Boundary node → clusters it forwards toward
    pub nodes: BTreeMap<NodeId, BTreeSet<ClusterId>>,
    /// Visible clusters no eligible member can forward toward
    pub gaps: BTreeSet<ClusterId>,
}

impl BoundarySet {
    pub fn is_boundary(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    /// Boundary nodes forwarding toward `cluster`.
    pub fn toward(&self, cluster: ClusterId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .filter(move |(_, toward)| toward.contains(&cluster))
            .map(|(&n, _)| n)
    }

    /// Every cluster this cluster can reach or sees without a forwarder.
    pub fn adjacent(&self) -> BTreeSet<ClusterId> {
        self.nodes
            .values()
            .flatten()
            .chain(self.gaps.iter())
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn forget(&mut self, node: NodeId) {
        self.nodes.remove(&node);
    }
}

/// Selects boundary nodes for every pair of mutually visible clusters.
#[derive(Debug, Clone)]
pub struct BoundaryElector {
    weights: BoundaryWeights,
    range: f64,
}

impl BoundaryElector {
    pub fn new(weights: BoundaryWeights, range: f64) -> Self {
        Self { weights, range }
    }

    pub fn weights(&self) -> &BoundaryWeights {
        &self.weights
    }

    pub fn range(&self) -> f64 {
        self.range
    }

    /// Compute fresh boundary sets for all clusters.
    ///
    /// Every cluster gets an entry, empty when it sees no other cluster.
    pub fn elect_all(
        &self,
        clusters: &BTreeMap<ClusterId, Cluster>,
        nodes: &NodeArena,
        ledger: &TrustLedger,
    ) -> BTreeMap<ClusterId, BoundarySet> {
        // own cluster → other cluster → member → members of other it sees
        let mut visible: BTreeMap<ClusterId, BTreeMap<ClusterId, BTreeMap<NodeId, usize>>> =
            BTreeMap::new();

        let clustered: Vec<(NodeId, ClusterId, vanet_topology::Position)> = nodes
            .iter()
            .filter_map(|n| n.cluster.map(|c| (n.id, c, n.position())))
            .collect();

        for (i, &(a, ca, pa)) in clustered.iter().enumerate() {
            for &(b, cb, pb) in &clustered[i + 1..] {
                if ca == cb || !within_range(pa, pb, self.range) {
                    continue;
                }
                *visible
                    .entry(ca)
                    .or_default()
                    .entry(cb)
                    .or_default()
                    .entry(a)
                    .or_default() += 1;
                *visible
                    .entry(cb)
                    .or_default()
                    .entry(ca)
                    .or_default()
                    .entry(b)
                    .or_default() += 1;
            }
        }

        let mut sets: BTreeMap<ClusterId, BoundarySet> =
            clusters.keys().map(|&id| (id, BoundarySet::default())).collect();

        for (own_id, toward) in visible {
            let (Some(own), Some(set)) = (clusters.get(&own_id), sets.get_mut(&own_id)) else {
                continue;
            };
            for (other, seen) in toward {
                match self.select(own, &seen, nodes, ledger) {
                    Some(node) => {
                        set.nodes.entry(node).or_default().insert(other);
                    }
                    None => {
                        debug!(cluster = %own_id, toward = %other, "no eligible boundary candidate");
                        set.gaps.insert(other);
                    }
                }
            }
        }

        sets
    }

    /// Best eligible candidate among members that see the other cluster.
    fn select(
        &self,
        own: &Cluster,
        seen: &BTreeMap<NodeId, usize>,
        nodes: &NodeArena,
        ledger: &TrustLedger,
    ) -> Option<NodeId> {
        let max_seen = seen.values().copied().max().unwrap_or(0).max(1) as f64;
        let mut best: Option<(NodeId, f64)> = None;

        for (&candidate, &count) in seen {
            if !ledger.is_eligible(candidate) {
                continue;
            }
            let Some(position) = nodes.position(candidate) else {
                continue;
            };
            let edge = if own.radius > 0.0 {
                (position.distance(&own.centroid) / own.radius).min(1.0)
            } else {
                1.0
            };
            let score = self.weights.trust * ledger.score(candidate)
                + self.weights.edge_proximity * edge
                + self.weights.connectivity * (count as f64 / max_seen);

            if best.map_or(true, |(_, s)| score > s) {
                best = Some((candidate, score));
            }
        }

        best.map(|(node, _)| node)
    }
}
