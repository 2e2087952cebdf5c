//! Trust-weighted leader election.
//!
//! Elections are failure-driven: the cluster layer calls [`ElectionEngine::hold`]
//! when a cluster forms, merges, splits, or loses its leader with no co-leader
//! to promote. There is no periodic re-election.
//!
//! # Composite score
//!
//! ```text
//! score = 0.30·trust + 0.25·connectivity + 0.20·stability + 0.15·centrality + 0.10·tenure
//! ```
//!
//! Every sub-metric is normalised to [0, 1]:
//! - connectivity = in-cluster neighbors / max observed in the cluster
//! - stability    = 1 / (1 + variance of recent position relative to centroid)
//! - centrality   = 1 - distance to centroid / max observed distance
//! - tenure       = ticks in cluster / cluster age, capped at 1
//!
//! # Voting
//!
//! Every member votes, weighted by its trust, for the top-ranked candidate it
//! can observe (itself included). A candidate with strictly more than 51% of
//! the cluster's total trust weight wins outright. Otherwise the best-ranked
//! candidate holding any votes wins by plurality, so an election always
//! terminates.
//!
//! Ranking is by composite score, ties broken by lowest node id. No
//! timestamps, no arrival order: the same inputs always give the same leader.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vanet_topology::NodeId;

use crate::error::Result;
use crate::threshold::{exceeds_majority, ELIGIBILITY_THRESHOLD};
use crate::weights::validate_weight_set;

/// Weights of the composite election score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElectionWeights {
    pub trust: f64,
    pub connectivity: f64,
    pub stability: f64,
    pub centrality: f64,
    pub tenure: f64,
}

impl Default for ElectionWeights {
    fn default() -> Self {
        Self {
            trust: 0.30,
            connectivity: 0.25,
            stability: 0.20,
            centrality: 0.15,
            tenure: 0.10,
        }
    }
}

impl ElectionWeights {
    pub fn validate(&self) -> Result<()> {
        validate_weight_set(
            "election",
            &[self.trust, self.connectivity, self.stability, self.centrality, self.tenure],
        )
    }
}

/// Raw metrics of one cluster member, as observed in the current tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub node: NodeId,
    pub trust: f64,
    pub malicious: bool,
    /// Members of the same cluster within DSRC range
    pub neighbor_count: usize,
    /// Variance of recent positions relative to the cluster centroid
    pub position_variance: f64,
    pub distance_to_centroid: f64,
    /// Ticks since joining the cluster
    pub tenure: u64,
}

impl Candidate {
    /// Trust > 0.5 and not flagged.
    pub fn is_eligible(&self) -> bool {
        !self.malicious && self.trust > ELIGIBILITY_THRESHOLD
    }
}

/// Normalised sub-metrics and composite score of one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub node: NodeId,
    pub trust: f64,
    pub connectivity: f64,
    pub stability: f64,
    pub centrality: f64,
    pub tenure: f64,
    pub composite: f64,
}

/// Ranking order: highest composite first, lowest id on ties.
fn rank(a: &CandidateScore, b: &CandidateScore) -> Ordering {
    b.composite
        .total_cmp(&a.composite)
        .then_with(|| a.node.cmp(&b.node))
}

/// How the leader was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectionOutcome {
    /// Winner held more than 51% of total trust weight
    Majority,
    /// No majority; best-ranked candidate with votes won
    Plurality,
    /// No eligible candidate; the cluster stays leaderless
    NoCandidates,
}

/// Summed trust weight received by one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoteCount {
    pub node: NodeId,
    pub weight: f64,
}

/// The latest election of a cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectionRecord {
    pub term: u64,
    pub tick: u64,
    /// Eligible candidates in rank order
    pub scores: Vec<CandidateScore>,
    pub leader: Option<NodeId>,
    pub co_leader: Option<NodeId>,
    pub tally: Vec<VoteCount>,
    pub total_weight: f64,
    pub outcome: ElectionOutcome,
}

impl ElectionRecord {
    /// Score breakdown of a candidate, if it was eligible.
    pub fn score_of(&self, node: NodeId) -> Option<&CandidateScore> {
        self.scores.iter().find(|s| s.node == node)
    }

    /// Votes received by a candidate.
    pub fn votes_for(&self, node: NodeId) -> f64 {
        self.tally
            .iter()
            .find(|v| v.node == node)
            .map_or(0.0, |v| v.weight)
    }
}

/// Cluster-wide inputs for normalisation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElectionContext {
    /// Ticks since the cluster formed
    pub cluster_age: u64,
}

/// Computes composite scores and runs trust-weighted votes.
#[derive(Debug, Clone, Default)]
pub struct ElectionEngine {
    weights: ElectionWeights,
}

impl ElectionEngine {
    pub fn new(weights: ElectionWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ElectionWeights {
        &self.weights
    }

    /// Score every eligible member, in rank order.
    ///
    /// Normalisation maxima are taken over all members, eligible or not.
    pub fn score(&self, ctx: ElectionContext, members: &[Candidate]) -> Vec<CandidateScore> {
        let max_neighbors = members.iter().map(|m| m.neighbor_count).max().unwrap_or(0);
        let max_distance = members
            .iter()
            .map(|m| m.distance_to_centroid)
            .fold(0.0, f64::max);

        let mut scores: Vec<CandidateScore> = members
            .iter()
            .filter(|m| m.is_eligible())
            .map(|m| {
                let trust = m.trust.clamp(0.0, 1.0);
                let connectivity = if max_neighbors == 0 {
                    0.0
                } else {
                    m.neighbor_count as f64 / max_neighbors as f64
                };
                let stability = 1.0 / (1.0 + m.position_variance.max(0.0));
                let centrality = if max_distance <= 0.0 {
                    1.0
                } else {
                    1.0 - (m.distance_to_centroid / max_distance).clamp(0.0, 1.0)
                };
                let tenure = if ctx.cluster_age == 0 {
                    1.0
                } else {
                    (m.tenure as f64 / ctx.cluster_age as f64).min(1.0)
                };
                let w = &self.weights;
                let composite = w.trust * trust
                    + w.connectivity * connectivity
                    + w.stability * stability
                    + w.centrality * centrality
                    + w.tenure * tenure;
                CandidateScore {
                    node: m.node,
                    trust,
                    connectivity,
                    stability,
                    centrality,
                    tenure,
                    composite,
                }
            })
            .collect();

        scores.sort_by(rank);
        scores
    }

    /// Run one election.
    ///
    /// `prior_term` is the cluster's current term; the record carries
    /// `prior_term + 1` whatever the outcome. `can_observe(voter, candidate)`
    /// reports whether a voter can see a candidate; every voter sees itself.
    pub fn hold<F>(
        &self,
        prior_term: u64,
        tick: u64,
        ctx: ElectionContext,
        members: &[Candidate],
        can_observe: F,
    ) -> ElectionRecord
    where
        F: Fn(NodeId, NodeId) -> bool,
    {
        let term = prior_term + 1;
        let scores = self.score(ctx, members);
        let total_weight: f64 = members.iter().map(|m| m.trust.clamp(0.0, 1.0)).sum();

        let mut tally: BTreeMap<NodeId, f64> = BTreeMap::new();
        for voter in members {
            let weight = voter.trust.clamp(0.0, 1.0);
            if weight <= 0.0 {
                continue;
            }
            let choice = scores
                .iter()
                .find(|c| c.node == voter.node || can_observe(voter.node, c.node));
            if let Some(choice) = choice {
                *tally.entry(choice.node).or_insert(0.0) += weight;
            }
        }

        let majority = scores
            .iter()
            .find(|c| exceeds_majority(tally.get(&c.node).copied().unwrap_or(0.0), total_weight))
            .map(|c| c.node);

        let (leader, outcome) = match majority {
            Some(node) => (Some(node), ElectionOutcome::Majority),
            None => {
                let plurality = scores
                    .iter()
                    .find(|c| tally.get(&c.node).is_some_and(|&w| w > 0.0))
                    .map(|c| c.node);
                match plurality {
                    Some(node) => {
                        warn!(term, %node, "no candidate reached majority, plurality fallback");
                        (Some(node), ElectionOutcome::Plurality)
                    }
                    None => (None, ElectionOutcome::NoCandidates),
                }
            }
        };

        let co_leader = leader.and_then(|l| scores.iter().find(|c| c.node != l).map(|c| c.node));

        debug!(term, ?leader, ?co_leader, ?outcome, candidates = scores.len(), "election held");

        ElectionRecord {
            term,
            tick,
            scores,
            leader,
            co_leader,
            tally: tally
                .into_iter()
                .map(|(node, weight)| VoteCount { node, weight })
                .collect(),
            total_weight,
            outcome,
        }
    }
}
