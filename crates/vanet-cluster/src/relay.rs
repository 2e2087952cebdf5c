//! Relay election for members beyond the leader's radio range.
//!
//! A member is out of range (OOR) when it cannot hear the leader directly.
//! Relays are chosen by greedy set cover: each round picks the eligible
//! candidate, connected to the leader or to an already selected relay, with
//! the best score
//!
//! `0.35·trust + 0.25·centrality + 0.20·stability + 0.20·coverage`
//!
//! where coverage is the share of OOR members it would newly cover. Rounds stop
//! when every OOR member is covered or no candidate adds coverage; whatever is
//! left is reported unreachable for the tick.
//!
//! The set is only recomputed when the cluster's radio topology changes, so
//! relays do not churn while the fleet cruises in formation.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;
use vanet_consensus::{validate_weight_set, Result, TrustLedger};
use vanet_topology::{NeighborTable, NodeId};

use crate::cluster::Cluster;
use crate::node::NodeArena;

/// Weights of the relay score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelayWeights {
    pub trust: f64,
    pub centrality: f64,
    pub stability: f64,
    pub coverage: f64,
}

impl Default for RelayWeights {
    fn default() -> Self {
        Self {
            trust: 0.35,
            centrality: 0.25,
            stability: 0.20,
            coverage: 0.20,
        }
    }
}

impl RelayWeights {
    pub fn validate(&self) -> Result<()> {
        validate_weight_set(
            "relay",
            &[self.trust, self.centrality, self.stability, self.coverage],
        )
    }
}

/// Relays of one cluster and the members they cover.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelaySet {
    /// Relay → OOR members it was selected to cover
    pub relays: BTreeMap<NodeId, BTreeSet<NodeId>>,
    /// OOR members no eligible relay could reach
    pub unreachable: BTreeSet<NodeId>,
}

impl RelaySet {
    pub fn is_relay(&self, node: NodeId) -> bool {
        self.relays.contains_key(&node)
    }

    pub fn relay_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.relays.keys().copied()
    }

    /// The relay covering an OOR member, if any.
    pub fn covering(&self, member: NodeId) -> Option<NodeId> {
        self.relays
            .iter()
            .find(|(_, covered)| covered.contains(&member))
            .map(|(&relay, _)| relay)
    }

    pub fn len(&self) -> usize {
        self.relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    pub(crate) fn forget(&mut self, node: NodeId) {
        self.relays.remove(&node);
        for covered in self.relays.values_mut() {
            covered.remove(&node);
        }
        self.unreachable.remove(&node);
    }
}

/// Radio topology a relay set was computed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RelayBasis {
    leader: NodeId,
    members: BTreeSet<NodeId>,
    eligible: BTreeSet<NodeId>,
    links: BTreeSet<(NodeId, NodeId)>,
}

impl RelayBasis {
    fn capture(cluster: &Cluster, leader: NodeId, table: &NeighborTable, ledger: &TrustLedger) -> Self {
        let mut links = BTreeSet::new();
        for &a in &cluster.members {
            for &b in table.neighbors(a) {
                if a < b && cluster.contains(b) {
                    links.insert((a, b));
                }
            }
        }
        Self {
            leader,
            members: cluster.members.clone(),
            eligible: cluster
                .members
                .iter()
                .copied()
                .filter(|&m| ledger.is_eligible(m))
                .collect(),
            links,
        }
    }
}

/// Greedy connected set cover over a cluster's OOR members.
#[derive(Debug, Clone, Default)]
pub struct RelayElector {
    weights: RelayWeights,
}

impl RelayElector {
    pub fn new(weights: RelayWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &RelayWeights {
        &self.weights
    }

    /// Recompute the cluster's relays if its radio topology changed.
    ///
    /// Returns true when the relay set was replaced.
    pub fn refresh(
        &self,
        cluster: &mut Cluster,
        nodes: &NodeArena,
        table: &NeighborTable,
        ledger: &TrustLedger,
    ) -> bool {
        let Some(leader) = cluster.leader else {
            let changed = !cluster.relays.relays.is_empty() || !cluster.relays.unreachable.is_empty();
            cluster.relays = RelaySet::default();
            cluster.relay_basis = None;
            return changed;
        };

        let basis = RelayBasis::capture(cluster, leader, table, ledger);
        if cluster.relay_basis.as_ref() == Some(&basis) {
            return false;
        }

        let relays = self.elect(cluster, leader, nodes, table, ledger);
        let changed = relays != cluster.relays;
        cluster.relays = relays;
        cluster.relay_basis = Some(basis);
        changed
    }

    /// Select relays for a cluster led by `leader`.
    pub fn elect(
        &self,
        cluster: &Cluster,
        leader: NodeId,
        nodes: &NodeArena,
        table: &NeighborTable,
        ledger: &TrustLedger,
    ) -> RelaySet {
        let oor: BTreeSet<NodeId> = cluster
            .members
            .iter()
            .copied()
            .filter(|&m| m != leader && !table.are_neighbors(leader, m))
            .collect();
        if oor.is_empty() {
            return RelaySet::default();
        }

        let max_distance = cluster
            .members
            .iter()
            .filter_map(|&m| nodes.position(m))
            .map(|p| p.distance(&cluster.centroid))
            .fold(0.0, f64::max);

        let candidates: Vec<NodeId> = cluster
            .members
            .iter()
            .copied()
            .filter(|&m| m != leader && ledger.is_eligible(m))
            .collect();

        let total = oor.len() as f64;
        let mut uncovered = oor;
        let mut backbone: BTreeSet<NodeId> = BTreeSet::from([leader]);
        let mut relays: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();

        while !uncovered.is_empty() {
            let mut best: Option<(NodeId, f64, BTreeSet<NodeId>)> = None;

            for &candidate in &candidates {
                if relays.contains_key(&candidate) {
                    continue;
                }
                let connected = table.neighbors(candidate).iter().any(|n| backbone.contains(n));
                if !connected {
                    continue;
                }
                let gain: BTreeSet<NodeId> = table
                    .neighbors(candidate)
                    .iter()
                    .copied()
                    .filter(|n| uncovered.contains(n))
                    .collect();
                if gain.is_empty() {
                    continue;
                }

                let Some(node) = nodes.get(candidate) else {
                    continue;
                };
                let centrality = if max_distance > 0.0 {
                    1.0 - node.position().distance(&cluster.centroid) / max_distance
                } else {
                    1.0
                };
                let score = self.weights.trust * ledger.score(candidate)
                    + self.weights.centrality * centrality
                    + self.weights.stability * node.stability()
                    + self.weights.coverage * (gain.len() as f64 / total);

                // Candidates are visited in id order, so strict > keeps the lowest id on ties
                if best.as_ref().map_or(true, |(_, s, _)| score > *s) {
                    best = Some((candidate, score, gain));
                }
            }

            let Some((relay, score, gain)) = best else {
                break;
            };
            debug!(cluster = %cluster.id, %relay, score, covers = gain.len(), "relay selected");
            for n in &gain {
                uncovered.remove(n);
            }
            backbone.insert(relay);
            relays.insert(relay, gain);
        }

        RelaySet {
            relays,
            unreachable: uncovered,
        }
    }
}
