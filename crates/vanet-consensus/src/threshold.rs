//! Voting thresholds for elections and authority quorums.
//!
//! Two thresholds drive the coordination core:
//! - Elections: a candidate wins outright with strictly more than 51% of the
//!   cluster's total trust weight.
//! - PoA flagging: at least 30% of a cluster's authorities must concur.
//!
//! Fractions are compared with a small tolerance so that `0.3 × 10` authorities
//! means exactly 3 reports, not 4.

/// Fraction of total trust weight a leader needs to win outright.
pub const MAJORITY_FRACTION: f64 = 0.51;

/// Default fraction of authorities that must concur before a node is flagged.
pub const DEFAULT_QUORUM_FRACTION: f64 = 0.30;

/// Trust at or above which a node is an authority.
pub const AUTHORITY_THRESHOLD: f64 = 0.8;

/// Trust strictly above which a node is eligible for elected roles.
pub const ELIGIBILITY_THRESHOLD: f64 = 0.5;

/// Suspicion at or above which a node is considered misbehaving.
pub const SUSPICION_THRESHOLD: f64 = 0.5;

/// Tolerance for floating point fraction comparisons.
const EPSILON: f64 = 1e-9;

/// Check if `weight` is a strict majority of `total`.
///
/// A zero total never produces a majority.
pub fn exceeds_majority(weight: f64, total: f64) -> bool {
    total > 0.0 && weight > total * MAJORITY_FRACTION
}

/// Check if `reports` out of `authorities` meets the quorum fraction.
///
/// No authorities means no quorum can form.
pub fn quorum_met(reports: usize, authorities: usize, fraction: f64) -> bool {
    if authorities == 0 {
        return false;
    }
    reports as f64 + EPSILON >= fraction * authorities as f64
}

/// Minimum number of concurring authorities for a quorum.
///
/// Formula: ceil(n × fraction), tolerant of float noise.
pub fn required_reports(authorities: usize, fraction: f64) -> usize {
    if authorities == 0 {
        return 0;
    }
    let raw = (fraction * authorities as f64 - EPSILON).ceil();
    (raw.max(0.0) as usize).min(authorities)
}

/// Calculate how many more reports are needed to meet quorum.
pub fn reports_needed(current: usize, authorities: usize, fraction: f64) -> usize {
    required_reports(authorities, fraction).saturating_sub(current)
}
