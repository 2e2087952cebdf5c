//! Cluster lifecycle and leadership.
//!
//! # Membership pass
//!
//! Runs first in every tick, against positions already updated by the
//! kinematic feed:
//!
//! 1. members whose speed or heading no longer matches the cluster leave
//! 2. clusters over the size or radius bound split (farthest-pair seeding), or
//!    evict their outermost members while the reshape cooldown is running
//! 3. nearby compatible clusters merge when the result stays within bounds
//! 4. unclustered nodes join the nearest compatible cluster with room
//! 5. clusters below the minimum size dissolve
//! 6. remaining unclustered nodes form new clusters from mutually compatible
//!    neighbours
//!
//! After the pass every cluster satisfies `min ≤ |members| ≤ max` and
//! `radius ≤ max_cluster_radius`.
//!
//! # Leadership pass
//!
//! Elections are failure-driven. A leader that departed, was evicted, was
//! flagged or lost radio contact with every member is replaced by the standing co-leader on the spot; the co-leader
//! slot then stays vacant until the next election. Without a co-leader, and
//! for every cluster created, merged or split, an election runs.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};
use vanet_consensus::{Candidate, ElectionContext, ElectionEngine, TrustLedger};
use vanet_topology::{centroid, farthest_pair, radius, KinematicState, NeighborTable, NodeId, Position, Velocity};

use crate::boundary::BoundaryElector;
use crate::change::{ClusterChange, LeaveReason};
use crate::cluster::{Cluster, ClusterId};
use crate::config::ClusterConfig;
use crate::error::Result;
use crate::fleet::Fleet;
use crate::relay::RelayElector;

/// Drives membership, elections and role refresh for a [`Fleet`].
#[derive(Debug, Clone)]
pub struct ClusterManager {
    config: ClusterConfig,
    elections: ElectionEngine,
    relays: RelayElector,
    boundaries: BoundaryElector,
}

impl ClusterManager {
    pub fn new(config: ClusterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            elections: ElectionEngine::new(config.election_weights),
            relays: RelayElector::new(config.relay_weights),
            boundaries: BoundaryElector::new(config.boundary_weights, config.boundary_detection_range),
            config,
        })
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Whether two vehicles may share a cluster.
    pub fn compatible(&self, a: &KinematicState, b: &KinematicState) -> bool {
        a.position.distance(&b.position) <= self.config.max_cluster_radius
            && self.moves_with(a, b.velocity)
    }

    /// Whether a vehicle moves like a reference velocity.
    fn moves_with(&self, state: &KinematicState, velocity: Velocity) -> bool {
        let reference = KinematicState::new(state.position, velocity);
        state.speed_difference(&reference) <= self.config.speed_threshold
            && state.heading_difference(&reference) <= self.config.direction_threshold
    }

    fn within_bounds(&self, cluster: &Cluster) -> bool {
        cluster.len() <= self.config.max_cluster_size
            && cluster.radius <= self.config.max_cluster_radius
    }

    // ------------------------------------------------------------------
    // Phase 1: membership
    // ------------------------------------------------------------------

    /// Run the membership pass.
    pub fn update_membership(&self, fleet: &mut Fleet, tick: u64) -> Vec<ClusterChange> {
        let mut changes = Vec::new();
        fleet.refresh_clusters();
        self.evict_incompatible(fleet, &mut changes);
        self.enforce_bounds(fleet, tick, &mut changes);
        self.merge_clusters(fleet, tick, &mut changes);
        self.join_unclustered(fleet, tick, &mut changes);
        self.dissolve_undersized(fleet, &mut changes);
        self.form_clusters(fleet, tick, &mut changes);
        fleet.record_history(self.config.history_window);
        changes
    }

    fn evict_incompatible(&self, fleet: &mut Fleet, changes: &mut Vec<ClusterChange>) {
        let ids: Vec<ClusterId> = fleet.clusters.keys().copied().collect();
        for id in ids {
            let Some(cluster) = fleet.clusters.get(&id) else {
                continue;
            };
            let heading = cluster.heading;
            let leaving: Vec<NodeId> = cluster
                .members
                .iter()
                .copied()
                .filter(|&m| {
                    fleet
                        .nodes
                        .get(m)
                        .is_some_and(|n| !self.moves_with(&n.state, heading))
                })
                .collect();
            if leaving.is_empty() {
                continue;
            }
            for node in leaving {
                fleet.detach(node);
                debug!(cluster = %id, %node, "member no longer moves with cluster");
                changes.push(ClusterChange::Left {
                    cluster: id,
                    node,
                    reason: LeaveReason::Incompatible,
                });
            }
            if let Some(cluster) = fleet.clusters.get_mut(&id) {
                cluster.refresh(&fleet.nodes);
            }
        }
    }

    fn enforce_bounds(&self, fleet: &mut Fleet, tick: u64, changes: &mut Vec<ClusterChange>) {
        let ids: Vec<ClusterId> = fleet.clusters.keys().copied().collect();
        for id in ids {
            let Some(cluster) = fleet.clusters.get(&id) else {
                continue;
            };
            if self.within_bounds(cluster) {
                continue;
            }
            if cluster.can_reshape(tick, self.config.reshape_cooldown) {
                self.split(fleet, id, tick, changes);
            } else {
                self.evict_outliers(fleet, id, changes);
            }
        }
    }

    /// Partition an oversized cluster until every part is within bounds.
    fn split(&self, fleet: &mut Fleet, id: ClusterId, tick: u64, changes: &mut Vec<ClusterChange>) {
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let Some(cluster) = fleet.clusters.get(&current) else {
                continue;
            };
            if self.within_bounds(cluster) {
                continue;
            }
            let points: Vec<(NodeId, Position)> = cluster
                .members
                .iter()
                .filter_map(|&m| fleet.nodes.position(m).map(|p| (m, p)))
                .collect();
            let Some((seed_a, seed_b)) = farthest_pair(&points) else {
                continue;
            };
            let (Some(pa), Some(pb)) = (fleet.nodes.position(seed_a), fleet.nodes.position(seed_b)) else {
                continue;
            };

            let moved: BTreeSet<NodeId> = points
                .iter()
                .filter(|(_, p)| p.distance_squared(&pb) < p.distance_squared(&pa))
                .map(|&(m, _)| m)
                .collect();

            let new_id = fleet.allocate_cluster_id();
            if let Some(cluster) = fleet.clusters.get_mut(&current) {
                for &m in &moved {
                    cluster.remove_member(m);
                }
                cluster.reset_leadership();
                cluster.last_reshape = tick;
                cluster.refresh(&fleet.nodes);
            }
            for &m in &moved {
                if let Some(node) = fleet.nodes.get_mut(m) {
                    node.join(new_id, tick);
                }
            }
            let mut part = Cluster::new(new_id, moved.clone(), tick);
            part.refresh(&fleet.nodes);
            fleet.clusters.insert(new_id, part);

            info!(from = %current, into = %new_id, moved = moved.len(), "cluster split");
            changes.push(ClusterChange::Split {
                from: current,
                into: new_id,
                moved: moved.into_iter().collect(),
            });
            pending.push(current);
            pending.push(new_id);
        }
    }

    /// Evict the outermost members until the cluster is within bounds.
    fn evict_outliers(&self, fleet: &mut Fleet, id: ClusterId, changes: &mut Vec<ClusterChange>) {
        loop {
            let Some(cluster) = fleet.clusters.get_mut(&id) else {
                return;
            };
            cluster.refresh(&fleet.nodes);
            if self.within_bounds(cluster) {
                return;
            }
            let reason = if cluster.radius > self.config.max_cluster_radius {
                LeaveReason::OutOfRange
            } else {
                LeaveReason::Overflow
            };
            let center = cluster.centroid;
            let outermost = cluster
                .members
                .iter()
                .filter_map(|&m| fleet.nodes.position(m).map(|p| (m, p.distance(&center))))
                .fold(None::<(NodeId, f64)>, |best, (m, d)| match best {
                    Some((_, bd)) if d <= bd => best,
                    _ => Some((m, d)),
                });
            let Some((node, _)) = outermost else {
                return;
            };
            fleet.detach(node);
            debug!(cluster = %id, %node, ?reason, "member evicted during reshape cooldown");
            changes.push(ClusterChange::Left {
                cluster: id,
                node,
                reason,
            });
        }
    }

    fn merge_clusters(&self, fleet: &mut Fleet, tick: u64, changes: &mut Vec<ClusterChange>) {
        let ids: Vec<ClusterId> = fleet.clusters.keys().copied().collect();
        for (i, &a) in ids.iter().enumerate() {
            for &b in &ids[i + 1..] {
                if !self.can_merge(fleet, a, b, tick) {
                    continue;
                }
                let Some(absorbed) = fleet.clusters.remove(&b) else {
                    continue;
                };
                for &m in &absorbed.members {
                    if let Some(node) = fleet.nodes.get_mut(m) {
                        node.join(a, tick);
                    }
                }
                if let Some(into) = fleet.clusters.get_mut(&a) {
                    into.members.extend(absorbed.members.iter().copied());
                    into.reset_leadership();
                    into.last_reshape = tick;
                    into.refresh(&fleet.nodes);
                    info!(into = %a, absorbed = %b, size = into.len(), "clusters merged");
                    changes.push(ClusterChange::Merged {
                        into: a,
                        absorbed: b,
                        size: into.len(),
                    });
                }
            }
        }
    }

    fn can_merge(&self, fleet: &Fleet, a: ClusterId, b: ClusterId, tick: u64) -> bool {
        let (Some(ca), Some(cb)) = (fleet.clusters.get(&a), fleet.clusters.get(&b)) else {
            return false;
        };
        let cooldown = self.config.reshape_cooldown;
        if !ca.can_reshape(tick, cooldown) || !cb.can_reshape(tick, cooldown) {
            return false;
        }
        if ca.len() + cb.len() > self.config.max_cluster_size
            || ca.centroid.distance(&cb.centroid) > self.config.max_cluster_radius
        {
            return false;
        }
        let reference = KinematicState::new(ca.centroid, ca.heading);
        if !self.moves_with(&reference, cb.heading) {
            return false;
        }
        let positions: Vec<Position> = ca
            .members
            .iter()
            .chain(cb.members.iter())
            .filter_map(|&m| fleet.nodes.position(m))
            .collect();
        let Some(center) = centroid(positions.iter().copied()) else {
            return false;
        };
        radius(positions, center) <= self.config.max_cluster_radius
    }

    fn join_unclustered(&self, fleet: &mut Fleet, tick: u64, changes: &mut Vec<ClusterChange>) {
        let loose: Vec<NodeId> = fleet.nodes.unclustered().map(|n| n.id).collect();
        for id in loose {
            let Some(node) = fleet.nodes.get(id) else {
                continue;
            };
            let state = node.state;

            let mut best: Option<(ClusterId, f64)> = None;
            for (&cid, cluster) in &fleet.clusters {
                if cluster.len() >= self.config.max_cluster_size || !self.moves_with(&state, cluster.heading) {
                    continue;
                }
                let distance = state.position.distance(&cluster.centroid);
                if distance > self.config.max_cluster_radius {
                    continue;
                }
                let positions: Vec<Position> = cluster
                    .members
                    .iter()
                    .filter_map(|&m| fleet.nodes.position(m))
                    .chain(std::iter::once(state.position))
                    .collect();
                let center = centroid(positions.iter().copied()).unwrap_or(state.position);
                if radius(positions, center) > self.config.max_cluster_radius {
                    continue;
                }
                if best.map_or(true, |(_, d)| distance < d) {
                    best = Some((cid, distance));
                }
            }

            let Some((cid, _)) = best else {
                continue;
            };
            if let Some(node) = fleet.nodes.get_mut(id) {
                node.join(cid, tick);
            }
            if let Some(cluster) = fleet.clusters.get_mut(&cid) {
                cluster.members.insert(id);
                cluster.refresh(&fleet.nodes);
            }
            debug!(cluster = %cid, node = %id, "node joined cluster");
            changes.push(ClusterChange::Joined { cluster: cid, node: id });
        }
    }

    fn dissolve_undersized(&self, fleet: &mut Fleet, changes: &mut Vec<ClusterChange>) {
        let undersized: Vec<ClusterId> = fleet
            .clusters
            .iter()
            .filter(|(_, c)| c.len() < self.config.min_cluster_size)
            .map(|(&id, _)| id)
            .collect();
        for id in undersized {
            let Some(cluster) = fleet.clusters.remove(&id) else {
                continue;
            };
            for &m in &cluster.members {
                if let Some(node) = fleet.nodes.get_mut(m) {
                    node.leave();
                }
            }
            info!(cluster = %id, released = cluster.len(), "cluster dissolved");
            changes.push(ClusterChange::Dissolved {
                cluster: id,
                released: cluster.members.into_iter().collect(),
            });
        }
    }

    fn form_clusters(&self, fleet: &mut Fleet, tick: u64, changes: &mut Vec<ClusterChange>) {
        let loose: Vec<(NodeId, KinematicState)> =
            fleet.nodes.unclustered().map(|n| (n.id, n.state)).collect();
        let mut used: BTreeSet<NodeId> = BTreeSet::new();

        for &(seed, seed_state) in &loose {
            if used.contains(&seed) {
                continue;
            }
            let mut others: Vec<(NodeId, KinematicState, f64)> = loose
                .iter()
                .filter(|(id, _)| *id != seed && !used.contains(id))
                .map(|&(id, s)| (id, s, s.position.distance(&seed_state.position)))
                .collect();
            others.sort_by(|a, b| a.2.total_cmp(&b.2).then(a.0.cmp(&b.0)));

            let mut group: Vec<(NodeId, KinematicState)> = vec![(seed, seed_state)];
            for (id, state, _) in others {
                if group.len() >= self.config.max_cluster_size {
                    break;
                }
                if group.iter().all(|(_, g)| self.compatible(g, &state)) {
                    group.push((id, state));
                }
            }
            if group.len() < self.config.min_cluster_size {
                continue;
            }

            let members: BTreeSet<NodeId> = group.iter().map(|&(id, _)| id).collect();
            let id = fleet.allocate_cluster_id();
            for &m in &members {
                used.insert(m);
                if let Some(node) = fleet.nodes.get_mut(m) {
                    node.join(id, tick);
                }
            }
            let mut cluster = Cluster::new(id, members.clone(), tick);
            cluster.refresh(&fleet.nodes);
            fleet.clusters.insert(id, cluster);

            info!(cluster = %id, size = members.len(), "cluster formed");
            changes.push(ClusterChange::Formed {
                cluster: id,
                members: members.into_iter().collect(),
            });
        }
    }

    // ------------------------------------------------------------------
    // Phase 3: leadership
    // ------------------------------------------------------------------

    /// Succession and failure-driven elections.
    ///
    /// A leader fails when it leaves the cluster, loses eligibility or can no
    /// longer hear any other member. A leaderless cluster is re-elected only
    /// once its electorate changes.
    pub fn resolve_leadership(
        &self,
        fleet: &mut Fleet,
        ledger: &TrustLedger,
        table: &NeighborTable,
        tick: u64,
    ) -> Vec<ClusterChange> {
        let mut changes = Vec::new();
        for cluster in fleet.clusters.values_mut() {
            let id = cluster.id;
            let valid = |n: Option<NodeId>| {
                n.is_some_and(|n| cluster.contains(n) && ledger.is_eligible(n) && !isolated(cluster, table, n))
            };

            let leader_ok = valid(cluster.leader);
            let co_ok = valid(cluster.co_leader) && cluster.co_leader != cluster.leader;
            if !co_ok && cluster.co_leader.is_some() {
                debug!(cluster = %id, co_leader = ?cluster.co_leader, "co-leader slot vacated");
                cluster.co_leader = None;
            }

            if !leader_ok {
                let previous = cluster.leader.take();
                if let Some(successor) = cluster.co_leader.take() {
                    info!(cluster = %id, ?previous, leader = %successor, "co-leader promoted");
                    cluster.leader = Some(successor);
                    changes.push(ClusterChange::LeaderSucceeded {
                        cluster: id,
                        previous,
                        leader: successor,
                    });
                } else if !cluster.election_pending {
                    warn!(cluster = %id, ?previous, "leader lost without co-leader");
                    cluster.election_pending = true;
                    changes.push(ClusterChange::LeaderVacant { cluster: id, previous });
                }
            }

            if !cluster.election_pending {
                continue;
            }

            let electorate: BTreeSet<NodeId> = cluster
                .members
                .iter()
                .copied()
                .filter(|&m| ledger.is_eligible(m) && !isolated(cluster, table, m))
                .collect();
            if cluster.failed_electorate.as_ref() == Some(&electorate) {
                continue;
            }

            let candidates: Vec<Candidate> = cluster
                .members
                .iter()
                .filter(|&&m| !isolated(cluster, table, m))
                .filter_map(|&m| fleet.nodes.get(m))
                .map(|node| Candidate {
                    node: node.id,
                    trust: ledger.score(node.id),
                    malicious: ledger.is_malicious(node.id),
                    neighbor_count: table.count_present_neighbors(node.id, |n| cluster.contains(n)),
                    position_variance: node.position_variance(),
                    distance_to_centroid: node.position().distance(&cluster.centroid),
                    tenure: node.tenure(tick),
                })
                .collect();
            let ctx = ElectionContext {
                cluster_age: cluster.age(tick),
            };
            let record = self
                .elections
                .hold(cluster.term, tick, ctx, &candidates, |voter, candidate| {
                    table.are_neighbors(voter, candidate)
                });

            cluster.term = record.term;
            cluster.leader = record.leader;
            cluster.co_leader = record.co_leader;
            cluster.election_pending = record.leader.is_none();
            cluster.failed_electorate = record.leader.is_none().then_some(electorate);
            // Relays hang off the leader, so a new leader invalidates them
            cluster.relay_basis = None;

            match record.leader {
                Some(leader) => info!(
                    cluster = %id,
                    term = record.term,
                    %leader,
                    co_leader = ?record.co_leader,
                    outcome = ?record.outcome,
                    "election held"
                ),
                None => warn!(cluster = %id, term = record.term, "no eligible candidate, cluster leaderless"),
            }

            let term = record.term;
            let leaderless = record.leader.is_none();
            changes.push(ClusterChange::ElectionHeld {
                cluster: id,
                record: record.clone(),
            });
            cluster.last_election = Some(record);
            if leaderless {
                changes.push(ClusterChange::Leaderless { cluster: id, term });
            }
        }
        changes
    }

    // ------------------------------------------------------------------
    // Phase 4: relays and boundaries
    // ------------------------------------------------------------------

    /// Refresh relay and boundary sets and derive node roles.
    pub fn refresh_roles(
        &self,
        fleet: &mut Fleet,
        ledger: &TrustLedger,
        table: &NeighborTable,
    ) -> Vec<ClusterChange> {
        let mut changes = Vec::new();

        for cluster in fleet.clusters.values_mut() {
            if self.relays.refresh(cluster, &fleet.nodes, table, ledger) {
                debug!(
                    cluster = %cluster.id,
                    relays = cluster.relays.len(),
                    unreachable = cluster.relays.unreachable.len(),
                    "relay set replaced"
                );
                changes.push(ClusterChange::RelaysUpdated {
                    cluster: cluster.id,
                    relays: cluster.relays.relay_ids().collect(),
                    unreachable: cluster.relays.unreachable.iter().copied().collect(),
                });
            }
        }

        let boundaries: BTreeMap<ClusterId, _> =
            self.boundaries.elect_all(&fleet.clusters, &fleet.nodes, ledger);
        for (id, set) in boundaries {
            let Some(cluster) = fleet.clusters.get_mut(&id) else {
                continue;
            };
            if cluster.boundaries != set {
                changes.push(ClusterChange::BoundariesUpdated {
                    cluster: id,
                    boundaries: set.nodes.keys().copied().collect(),
                    gaps: set.gaps.iter().copied().collect(),
                });
                cluster.boundaries = set;
            }
        }

        fleet.assign_roles();
        changes
    }
}

/// A member of a multi-vehicle cluster that hears no other member.
fn isolated(cluster: &Cluster, table: &NeighborTable, node: NodeId) -> bool {
    cluster.len() > 1 && table.count_present_neighbors(node, |n| n != node && cluster.contains(n)) == 0
}
