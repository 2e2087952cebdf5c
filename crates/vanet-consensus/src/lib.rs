//! Trust-Weighted Cluster Consensus
//!
//! Leadership in a VANET cluster is decided by trust, not by who shouted
//! first. This crate holds the three pieces every cluster decision reads:
//!
//! - [`TrustLedger`]: per-node trust, suspicion and malicious flags
//! - [`ElectionEngine`]: composite scoring and trust-weighted voting
//! - [`PoADetector`]: proof-of-authority flagging by authority quorum
//!
//! # Thresholds
//!
//! - Election: winner needs > 51% of the cluster's total trust weight, with a
//!   plurality fallback so no election stalls.
//! - Authorities: trust ≥ 0.8.
//! - Flagging: suspicion ≥ 0.5 and ≥ 30% of authorities concurring.
//! - Eligibility for elected roles: trust > 0.5 and not flagged.
//!
//! None of these components knows about clusters or positions beyond the
//! plain inputs it is given, so each can be driven directly from tests.

mod error;
mod threshold;
mod weights;

pub mod election;
pub mod poa;
pub mod trust;

pub use error::{Error, Result};
pub use threshold::{
    exceeds_majority, quorum_met, reports_needed, required_reports, AUTHORITY_THRESHOLD,
    DEFAULT_QUORUM_FRACTION, ELIGIBILITY_THRESHOLD, MAJORITY_FRACTION, SUSPICION_THRESHOLD,
};
pub use weights::{validate_positive, validate_unit, validate_weight_set, WEIGHT_SUM_TOLERANCE};

pub use election::{
    Candidate, CandidateScore, ElectionContext, ElectionEngine, ElectionOutcome, ElectionRecord,
    ElectionWeights, VoteCount,
};
pub use poa::{
    AnomalyFeatures, AnomalyLimits, Assessment, Flagging, PassOutcome, PoADetector, PoaConfig,
    SuspicionReport, SuspicionWeights, TrafficSample, Verdict,
};
pub use trust::{
    ExponentialRecovery, LinearRecovery, Penalty, RecoveryContext, RecoveryCurve, RecoveryPolicy,
    TrustEntry, TrustLedger, DEFAULT_PENALTY_FACTOR, NEUTRAL_TRUST,
};
