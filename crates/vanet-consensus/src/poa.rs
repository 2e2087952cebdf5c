//! Proof-of-authority malicious node detection.
//!
//! # Suspicion
//!
//! Every tick each node is scored from four observable anomalies, each
//! normalised to [0, 1]:
//! - implausible change of speed between ticks
//! - duplicate or replayed message digests
//! - position discontinuity against dead reckoning ("teleport")
//! - broadcast rate above the per-tick limit
//!
//! The suspicion score is their weighted sum.
//!
//! # Authority quorum
//!
//! Authorities are nodes with trust ≥ 0.8. A node is flagged only when its own
//! suspicion is ≥ 0.5 AND at least 30% of its cluster's authorities
//! independently report suspicion ≥ 0.5 in the same window. A single observer
//! can never flag a node on its own.
//!
//! Authorities are subject to the same evaluation: an authority under review
//! is excluded from the panel judging it, so its peers decide.
//!
//! # Effect
//!
//! Flagging applies the trust penalty once, demotes the node and makes it
//! ineligible until the ledger clears the flag (see [`crate::trust`]).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vanet_topology::{KinematicState, NodeId};

use crate::error::Result;
use crate::threshold::{
    quorum_met, required_reports, AUTHORITY_THRESHOLD, DEFAULT_QUORUM_FRACTION, SUSPICION_THRESHOLD,
};
use crate::trust::{TrustLedger, DEFAULT_PENALTY_FACTOR};
use crate::weights::{validate_positive, validate_unit, validate_weight_set};

/// Weights of the four anomaly indicators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuspicionWeights {
    pub speed_delta: f64,
    pub replay: f64,
    pub teleport: f64,
    pub broadcast_rate: f64,
}

impl Default for SuspicionWeights {
    fn default() -> Self {
        Self {
            speed_delta: 0.25,
            replay: 0.30,
            teleport: 0.30,
            broadcast_rate: 0.15,
        }
    }
}

impl SuspicionWeights {
    pub fn validate(&self) -> Result<()> {
        validate_weight_set(
            "suspicion",
            &[self.speed_delta, self.replay, self.teleport, self.broadcast_rate],
        )
    }
}

/// Scales that map raw anomalies onto [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyLimits {
    /// Speed change per tick that saturates the indicator (m/tick per tick)
    pub max_speed_delta: f64,
    /// Dead-reckoning error that saturates the indicator (m)
    pub teleport_distance: f64,
    /// Messages per tick before the rate indicator starts rising
    pub broadcast_rate_limit: u32,
}

impl Default for AnomalyLimits {
    fn default() -> Self {
        Self {
            max_speed_delta: 15.0,
            teleport_distance: 60.0,
            broadcast_rate_limit: 10,
        }
    }
}

impl AnomalyLimits {
    pub fn validate(&self) -> Result<()> {
        validate_positive("max_speed_delta", self.max_speed_delta)?;
        validate_positive("teleport_distance", self.teleport_distance)?;
        validate_positive("broadcast_rate_limit", f64::from(self.broadcast_rate_limit))
    }
}

/// Messages a node sent in one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrafficSample {
    pub sent: u32,
    /// Messages whose digest had already been seen
    pub replayed: u32,
}

/// Normalised anomaly indicators for one node in one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AnomalyFeatures {
    pub speed_delta: f64,
    pub replay: f64,
    pub teleport: f64,
    pub broadcast_excess: f64,
}

impl AnomalyFeatures {
    /// Extract indicators from two consecutive kinematic states and the
    /// node's traffic. A node seen for the first time has no kinematic anomalies.
    pub fn observe(
        previous: Option<&KinematicState>,
        current: &KinematicState,
        traffic: TrafficSample,
        limits: &AnomalyLimits,
    ) -> Self {
        let (speed_delta, teleport) = match previous {
            Some(prev) => {
                let dv = current.speed_difference(prev);
                let jump = prev.predict(1.0).distance(&current.position);
                (
                    (dv / limits.max_speed_delta).clamp(0.0, 1.0),
                    (jump / limits.teleport_distance).clamp(0.0, 1.0),
                )
            }
            None => (0.0, 0.0),
        };

        let replay = if traffic.sent == 0 {
            0.0
        } else {
            (f64::from(traffic.replayed) / f64::from(traffic.sent)).clamp(0.0, 1.0)
        };

        let limit = f64::from(limits.broadcast_rate_limit.max(1));
        let broadcast_excess = ((f64::from(traffic.sent) - limit) / limit).clamp(0.0, 1.0);

        Self {
            speed_delta,
            replay,
            teleport,
            broadcast_excess,
        }
    }

    /// Weighted suspicion score in [0, 1].
    pub fn suspicion(&self, weights: &SuspicionWeights) -> f64 {
        (weights.speed_delta * self.speed_delta
            + weights.replay * self.replay
            + weights.teleport * self.teleport
            + weights.broadcast_rate * self.broadcast_excess)
            .clamp(0.0, 1.0)
    }
}

/// Detector configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoaConfig {
    pub authority_threshold: f64,
    pub quorum_fraction: f64,
    pub suspicion_threshold: f64,
    pub penalty_factor: f64,
    pub weights: SuspicionWeights,
    pub limits: AnomalyLimits,
}

impl Default for PoaConfig {
    fn default() -> Self {
        Self {
            authority_threshold: AUTHORITY_THRESHOLD,
            quorum_fraction: DEFAULT_QUORUM_FRACTION,
            suspicion_threshold: SUSPICION_THRESHOLD,
            penalty_factor: DEFAULT_PENALTY_FACTOR,
            weights: SuspicionWeights::default(),
            limits: AnomalyLimits::default(),
        }
    }
}

impl PoaConfig {
    pub fn validate(&self) -> Result<()> {
        validate_unit("authority_threshold", self.authority_threshold)?;
        validate_unit("quorum_fraction", self.quorum_fraction)?;
        validate_unit("suspicion_threshold", self.suspicion_threshold)?;
        validate_unit("penalty_factor", self.penalty_factor)?;
        self.weights.validate()?;
        self.limits.validate()
    }
}

/// One observer's suspicion of one subject.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuspicionReport {
    pub observer: NodeId,
    pub subject: NodeId,
    pub suspicion: f64,
}

/// A node's own suspicion score for this window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub node: NodeId,
    pub suspicion: f64,
}

/// Outcome of evaluating one subject.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub subject: NodeId,
    pub suspicion: f64,
    /// Authorities on the panel (subject excluded)
    pub authorities: usize,
    /// Panel members reporting suspicion at or above threshold
    pub concurring: usize,
    pub flagged: bool,
}

/// A node flagged malicious in this pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Flagging {
    pub node: NodeId,
    pub suspicion: f64,
    pub concurring: usize,
    pub authorities: usize,
    pub trust_before: f64,
    pub trust_after: f64,
}

/// Everything a detection pass changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassOutcome {
    pub verdicts: Vec<Verdict>,
    pub flagged: Vec<Flagging>,
    /// Nodes whose malicious flag cleared this tick
    pub cleared: Vec<NodeId>,
}

/// Proof-of-authority detector.
#[derive(Debug, Clone, Default)]
pub struct PoADetector {
    config: PoaConfig,
}

impl PoADetector {
    pub fn new(config: PoaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PoaConfig {
        &self.config
    }

    /// Suspicion score for a feature vector under this detector's weights.
    pub fn suspicion(&self, features: &AnomalyFeatures) -> f64 {
        features.suspicion(&self.config.weights)
    }

    /// Authorities among `members` according to the ledger.
    pub fn authorities<'a, I>(&self, ledger: &TrustLedger, members: I) -> Vec<NodeId>
    where
        I: IntoIterator<Item = &'a NodeId>,
    {
        members
            .into_iter()
            .copied()
            .filter(|&n| ledger.is_authority(n, self.config.authority_threshold))
            .collect()
    }

    /// Evaluate one subject against its cluster's authority panel.
    pub fn evaluate(
        &self,
        subject: NodeId,
        suspicion: f64,
        authorities: &[NodeId],
        reports: &[SuspicionReport],
    ) -> Verdict {
        let threshold = self.config.suspicion_threshold;
        let panel: BTreeSet<NodeId> = authorities.iter().copied().filter(|&a| a != subject).collect();

        // Distinct observers only: repeated reports from one authority count once
        let concurring: BTreeSet<NodeId> = reports
            .iter()
            .filter(|r| r.subject == subject && r.suspicion >= threshold && panel.contains(&r.observer))
            .map(|r| r.observer)
            .collect();

        let flagged = suspicion >= threshold
            && quorum_met(concurring.len(), panel.len(), self.config.quorum_fraction);

        Verdict {
            subject,
            suspicion,
            authorities: panel.len(),
            concurring: concurring.len(),
            flagged,
        }
    }

    /// Run a full detection pass over one cluster (or the unclustered pool).
    ///
    /// `authorities` must be computed from the ledger before the pass starts,
    /// so penalties applied in this pass do not change the panel mid-window.
    pub fn run_pass(
        &self,
        ledger: &mut TrustLedger,
        tick: u64,
        assessments: &[Assessment],
        authorities: &[NodeId],
        reports: &[SuspicionReport],
    ) -> PassOutcome {
        let threshold = self.config.suspicion_threshold;
        let verdicts: Vec<Verdict> = assessments
            .iter()
            .map(|a| self.evaluate(a.node, a.suspicion, authorities, reports))
            .collect();

        let mut outcome = PassOutcome::default();
        for verdict in &verdicts {
            let node = verdict.subject;
            ledger.record_suspicion(node, verdict.suspicion);

            if verdict.flagged {
                if let Some(penalty) = ledger.penalize(node, self.config.penalty_factor, tick) {
                    warn!(
                        %node,
                        suspicion = verdict.suspicion,
                        concurring = verdict.concurring,
                        authorities = verdict.authorities,
                        trust = penalty.after,
                        "node flagged malicious by authority quorum"
                    );
                    outcome.flagged.push(Flagging {
                        node,
                        suspicion: verdict.suspicion,
                        concurring: verdict.concurring,
                        authorities: verdict.authorities,
                        trust_before: penalty.before,
                        trust_after: penalty.after,
                    });
                }
            } else if verdict.suspicion >= threshold {
                debug!(
                    %node,
                    concurring = verdict.concurring,
                    needed = required_reports(verdict.authorities, self.config.quorum_fraction),
                    "suspicion below authority quorum"
                );
                ledger.mark_suspicious(node);
            } else if ledger.recover(node, tick) {
                debug!(%node, trust = ledger.score(node), "malicious flag cleared");
                outcome.cleared.push(node);
            }
        }

        outcome.verdicts = verdicts;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vanet_topology::{Position, Velocity};

    fn ids(range: std::ops::Range<u64>) -> Vec<NodeId> {
        range.map(NodeId).collect()
    }

    fn report(observer: u64, subject: u64, suspicion: f64) -> SuspicionReport {
        SuspicionReport {
            observer: NodeId(observer),
            subject: NodeId(subject),
            suspicion,
        }
    }

    /// Cluster of 10 nodes: ids 0..5 are authorities (trust 0.9), 5..10 are not.
    fn cluster_ledger() -> TrustLedger {
        let mut ledger = TrustLedger::new();
        for n in ids(0..10) {
            ledger.register(n);
            ledger.set_score(n, if n.0 < 5 { 0.9 } else { 0.7 });
        }
        ledger
    }

    #[test]
    fn default_config_is_valid() {
        assert!(PoaConfig::default().validate().is_ok());
    }

    #[test]
    fn two_of_five_authorities_flag() {
        let detector = PoADetector::default();
        let mut ledger = cluster_ledger();
        let authorities = detector.authorities(&ledger, &ids(0..10));
        assert_eq!(authorities.len(), 5);

        let subject = 7;
        let reports = [report(0, subject, 0.6), report(1, subject, 0.6)];
        let assessments = [Assessment {
            node: NodeId(subject),
            suspicion: 0.6,
        }];

        let outcome = detector.run_pass(&mut ledger, 3, &assessments, &authorities, &reports);
        assert_eq!(outcome.flagged.len(), 1);
        assert_eq!(outcome.verdicts[0].concurring, 2);
        assert!(ledger.is_malicious(NodeId(subject)));
        assert!((ledger.score(NodeId(subject)) - 0.49).abs() < 1e-9);
    }

    #[test]
    fn one_of_five_authorities_does_not_flag() {
        let detector = PoADetector::default();
        let mut ledger = cluster_ledger();
        let authorities = detector.authorities(&ledger, &ids(0..10));

        let reports = [report(0, 7, 0.6)];
        let assessments = [Assessment {
            node: NodeId(7),
            suspicion: 0.6,
        }];

        let outcome = detector.run_pass(&mut ledger, 3, &assessments, &authorities, &reports);
        assert!(outcome.flagged.is_empty());
        assert!(!outcome.verdicts[0].flagged);
        assert!(!ledger.is_malicious(NodeId(7)));
        assert!((ledger.score(NodeId(7)) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn low_suspicion_never_flags_even_with_full_quorum() {
        let detector = PoADetector::default();
        let authorities = ids(0..5);
        let reports: Vec<_> = (0..5).map(|a| report(a, 7, 0.9)).collect();
        let verdict = detector.evaluate(NodeId(7), 0.4, &authorities, &reports);
        assert!(!verdict.flagged);
        assert_eq!(verdict.concurring, 5);
    }

    #[test]
    fn non_authority_reports_do_not_count() {
        let detector = PoADetector::default();
        let authorities = ids(0..5);
        let reports: Vec<_> = (5..10).map(|o| report(o, 3, 0.9)).collect();
        let verdict = detector.evaluate(NodeId(3), 0.9, &authorities, &reports);
        assert_eq!(verdict.concurring, 0);
        assert!(!verdict.flagged);
    }

    #[test]
    fn duplicate_reports_from_one_authority_count_once() {
        let detector = PoADetector::default();
        let authorities = ids(0..5);
        let reports = [report(0, 7, 0.9), report(0, 7, 0.9), report(0, 7, 0.8)];
        let verdict = detector.evaluate(NodeId(7), 0.9, &authorities, &reports);
        assert_eq!(verdict.concurring, 1);
        assert!(!verdict.flagged);
    }

    #[test]
    fn authority_is_judged_by_its_peers() {
        let detector = PoADetector::default();
        let authorities = ids(0..5);
        // Authority 2 under review; it cannot vote on itself
        let reports = [report(2, 2, 0.0), report(0, 2, 0.7), report(1, 2, 0.7)];
        let verdict = detector.evaluate(NodeId(2), 0.7, &authorities, &reports);
        assert_eq!(verdict.authorities, 4);
        assert_eq!(verdict.concurring, 2);
        assert!(verdict.flagged);
    }

    #[test]
    fn no_authorities_cannot_flag() {
        let detector = PoADetector::default();
        let verdict = detector.evaluate(NodeId(1), 1.0, &[], &[]);
        assert!(!verdict.flagged);
    }

    #[test]
    fn penalty_is_not_compounded_across_ticks() {
        let detector = PoADetector::default();
        let mut ledger = cluster_ledger();
        let authorities = detector.authorities(&ledger, &ids(0..10));
        let reports = [report(0, 7, 0.8), report(1, 7, 0.8)];
        let assessments = [Assessment {
            node: NodeId(7),
            suspicion: 0.8,
        }];

        detector.run_pass(&mut ledger, 1, &assessments, &authorities, &reports);
        let after_first = ledger.score(NodeId(7));
        let second = detector.run_pass(&mut ledger, 2, &assessments, &authorities, &reports);
        assert!(second.flagged.is_empty());
        assert_eq!(ledger.score(NodeId(7)), after_first);
    }

    #[test]
    fn clean_ticks_recover_trust() {
        let detector = PoADetector::default();
        let mut ledger = cluster_ledger();
        let assessments = [Assessment {
            node: NodeId(7),
            suspicion: 0.1,
        }];
        detector.run_pass(&mut ledger, 1, &assessments, &[], &[]);
        assert!(ledger.score(NodeId(7)) > 0.7);
    }

    #[test]
    fn teleport_detected_from_dead_reckoning() {
        let limits = AnomalyLimits::default();
        let prev = KinematicState::new(Position::ORIGIN, Velocity::new(20.0, 0.0));
        let honest = KinematicState::new(Position::new(20.0, 0.0), Velocity::new(20.0, 0.0));
        let jumped = KinematicState::new(Position::new(500.0, 0.0), Velocity::new(20.0, 0.0));

        let f_honest = AnomalyFeatures::observe(Some(&prev), &honest, TrafficSample::default(), &limits);
        let f_jumped = AnomalyFeatures::observe(Some(&prev), &jumped, TrafficSample::default(), &limits);
        assert_eq!(f_honest.teleport, 0.0);
        assert_eq!(f_jumped.teleport, 1.0);
    }

    #[test]
    fn first_sighting_has_no_kinematic_anomaly() {
        let limits = AnomalyLimits::default();
        let now = KinematicState::new(Position::new(1e4, 0.0), Velocity::new(60.0, 0.0));
        let f = AnomalyFeatures::observe(None, &now, TrafficSample::default(), &limits);
        assert_eq!(f, AnomalyFeatures::default());
    }

    #[test]
    fn traffic_indicators() {
        let limits = AnomalyLimits::default();
        let s = KinematicState::default();
        let replaying = TrafficSample { sent: 4, replayed: 2 };
        let flooding = TrafficSample { sent: 25, replayed: 0 };

        let f = AnomalyFeatures::observe(Some(&s), &s, replaying, &limits);
        assert!((f.replay - 0.5).abs() < 1e-12);
        assert_eq!(f.broadcast_excess, 0.0);

        let f = AnomalyFeatures::observe(Some(&s), &s, flooding, &limits);
        assert_eq!(f.broadcast_excess, 1.0);
    }

    #[test]
    fn suspicion_is_weighted_sum() {
        let f = AnomalyFeatures {
            speed_delta: 1.0,
            replay: 0.0,
            teleport: 1.0,
            broadcast_excess: 0.0,
        };
        let s = f.suspicion(&SuspicionWeights::default());
        assert!((s - 0.55).abs() < 1e-12);
    }
}
