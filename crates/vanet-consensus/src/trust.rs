//! Per-node trust ledger.
//!
//! Every node gets an entry with neutral trust (1.0) when it first appears.
//! The PoA detector is the only writer during a tick: it records suspicion,
//! applies penalties when a node is flagged, and lets clean nodes recover.
//!
//! # Penalty
//!
//! Flagging multiplies trust by the penalty factor exactly once per flagging
//! event. While a node stays flagged, further evidence does not compound the
//! penalty.
//!
//! # Recovery
//!
//! Recovery is a [`RecoveryCurve`], applied once per clean tick. During the
//! curve's cooldown the score is capped below the pre-penalty value. The
//! malicious flag clears once the cooldown has elapsed and trust is back above
//! the eligibility threshold.
//!
//! Scores are clamped to [0, 1] after every mutation.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use vanet_topology::NodeId;

use crate::threshold::ELIGIBILITY_THRESHOLD;

/// Trust assigned to a node on first appearance.
pub const NEUTRAL_TRUST: f64 = 1.0;

/// Default multiplicative penalty on flagging.
pub const DEFAULT_PENALTY_FACTOR: f64 = 0.7;

/// Smoothing factor of the suspicion accumulator.
const SUSPICION_SMOOTHING: f64 = 0.5;

/// Ledger entry for one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustEntry {
    pub node: NodeId,
    /// Current trust in [0, 1]
    pub score: f64,
    /// Exponentially smoothed suspicion
    pub suspicion: f64,
    /// Suspicion from the latest evaluation
    pub last_suspicion: f64,
    /// Tick of the latest penalty
    pub last_penalty_tick: Option<u64>,
    /// Score just before the latest penalty
    pub pre_penalty_score: Option<f64>,
    /// Flagged by an authority quorum and not yet recovered
    pub malicious: bool,
    /// Consecutive ticks without suspicious behaviour
    pub clean_ticks: u64,
}

impl TrustEntry {
    fn new(node: NodeId) -> Self {
        Self {
            node,
            score: NEUTRAL_TRUST,
            suspicion: 0.0,
            last_suspicion: 0.0,
            last_penalty_tick: None,
            pre_penalty_score: None,
            malicious: false,
            clean_ticks: 0,
        }
    }
}

/// Inputs a recovery curve may use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecoveryContext {
    /// Ticks since the latest penalty, if any
    pub ticks_since_penalty: Option<u64>,
    /// Score before the latest penalty, if any
    pub pre_penalty_score: Option<f64>,
    /// Consecutive clean ticks including this one
    pub clean_ticks: u64,
}

/// A trust recovery policy.
///
/// Implementations must never decrease the score.
pub trait RecoveryCurve: fmt::Debug + Send + Sync {
    /// Trust after one more clean tick.
    fn recover(&self, current: f64, ctx: &RecoveryContext) -> f64;

    /// Ticks after a penalty during which recovery is capped below the
    /// pre-penalty score and the malicious flag cannot clear.
    fn cooldown_ticks(&self) -> u64;
}

/// Ceiling during the cooldown window, never below the current score.
fn recovery_cap(current: f64, ctx: &RecoveryContext, cooldown: u64, margin: f64) -> f64 {
    match (ctx.ticks_since_penalty, ctx.pre_penalty_score) {
        (Some(elapsed), Some(pre)) if elapsed < cooldown => (pre - margin).max(current),
        _ => NEUTRAL_TRUST,
    }
}

/// Fixed increment per clean tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearRecovery {
    pub step: f64,
    pub cooldown_ticks: u64,
    pub cap_margin: f64,
}

impl Default for LinearRecovery {
    fn default() -> Self {
        Self {
            step: 0.01,
            cooldown_ticks: 20,
            cap_margin: 0.05,
        }
    }
}

impl RecoveryCurve for LinearRecovery {
    fn recover(&self, current: f64, ctx: &RecoveryContext) -> f64 {
        let cap = recovery_cap(current, ctx, self.cooldown_ticks, self.cap_margin);
        (current + self.step).min(cap).max(current).clamp(0.0, 1.0)
    }

    fn cooldown_ticks(&self) -> u64 {
        self.cooldown_ticks
    }
}

/// Closes a fixed fraction of the gap to full trust per clean tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExponentialRecovery {
    pub rate: f64,
    pub cooldown_ticks: u64,
    pub cap_margin: f64,
}

impl Default for ExponentialRecovery {
    fn default() -> Self {
        Self {
            rate: 0.05,
            cooldown_ticks: 20,
            cap_margin: 0.05,
        }
    }
}

impl RecoveryCurve for ExponentialRecovery {
    fn recover(&self, current: f64, ctx: &RecoveryContext) -> f64 {
        let cap = recovery_cap(current, ctx, self.cooldown_ticks, self.cap_margin);
        let next = current + self.rate * (NEUTRAL_TRUST - current);
        next.min(cap).max(current).clamp(0.0, 1.0)
    }

    fn cooldown_ticks(&self) -> u64 {
        self.cooldown_ticks
    }
}

/// Serializable choice of recovery curve for configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "curve", rename_all = "snake_case")]
pub enum RecoveryPolicy {
    Linear(LinearRecovery),
    Exponential(ExponentialRecovery),
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        RecoveryPolicy::Linear(LinearRecovery::default())
    }
}

impl RecoveryCurve for RecoveryPolicy {
    fn recover(&self, current: f64, ctx: &RecoveryContext) -> f64 {
        match self {
            RecoveryPolicy::Linear(c) => c.recover(current, ctx),
            RecoveryPolicy::Exponential(c) => c.recover(current, ctx),
        }
    }

    fn cooldown_ticks(&self) -> u64 {
        match self {
            RecoveryPolicy::Linear(c) => c.cooldown_ticks(),
            RecoveryPolicy::Exponential(c) => c.cooldown_ticks(),
        }
    }
}

/// Result of applying a penalty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Penalty {
    pub before: f64,
    pub after: f64,
}

/// Trust scores and malicious flags for every live node.
#[derive(Debug)]
pub struct TrustLedger {
    entries: BTreeMap<NodeId, TrustEntry>,
    curve: Box<dyn RecoveryCurve>,
}

impl Default for TrustLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl TrustLedger {
    /// Create an empty ledger with the default linear recovery.
    pub fn new() -> Self {
        Self::with_curve(LinearRecovery::default())
    }

    /// Create an empty ledger with a custom recovery curve.
    pub fn with_curve<C: RecoveryCurve + 'static>(curve: C) -> Self {
        Self {
            entries: BTreeMap::new(),
            curve: Box::new(curve),
        }
    }

    /// The active recovery curve.
    pub fn curve(&self) -> &dyn RecoveryCurve {
        self.curve.as_ref()
    }

    /// Create an entry with neutral trust. Returns false if it already existed.
    pub fn register(&mut self, node: NodeId) -> bool {
        if self.entries.contains_key(&node) {
            return false;
        }
        self.entries.insert(node, TrustEntry::new(node));
        true
    }

    /// Drop the entry of a departed node.
    pub fn remove(&mut self, node: NodeId) -> Option<TrustEntry> {
        self.entries.remove(&node)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.entries.contains_key(&node)
    }

    pub fn entry(&self, node: NodeId) -> Option<&TrustEntry> {
        self.entries.get(&node)
    }

    /// All entries in id order.
    pub fn entries(&self) -> impl Iterator<Item = &TrustEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Trust of a node. Unknown nodes are untrusted (0.0).
    pub fn score(&self, node: NodeId) -> f64 {
        self.entries.get(&node).map_or(0.0, |e| e.score)
    }

    /// Overwrite a node's trust, clamped to [0, 1]. Registers unknown nodes.
    pub fn set_score(&mut self, node: NodeId, score: f64) {
        let entry = self
            .entries
            .entry(node)
            .or_insert_with(|| TrustEntry::new(node));
        entry.score = score.clamp(0.0, 1.0);
    }

    pub fn is_malicious(&self, node: NodeId) -> bool {
        self.entries.get(&node).is_some_and(|e| e.malicious)
    }

    /// Authorities vote on suspicion: trust at or above `threshold` and not flagged.
    pub fn is_authority(&self, node: NodeId, threshold: f64) -> bool {
        self.entries
            .get(&node)
            .is_some_and(|e| !e.malicious && e.score >= threshold)
    }

    /// Eligible for leader, co-leader, relay and boundary roles.
    pub fn is_eligible(&self, node: NodeId) -> bool {
        self.entries
            .get(&node)
            .is_some_and(|e| !e.malicious && e.score > ELIGIBILITY_THRESHOLD)
    }

    /// Fold a fresh suspicion score into the node's accumulator.
    pub fn record_suspicion(&mut self, node: NodeId, suspicion: f64) {
        if let Some(entry) = self.entries.get_mut(&node) {
            let s = suspicion.clamp(0.0, 1.0);
            entry.last_suspicion = s;
            entry.suspicion = entry.suspicion * (1.0 - SUSPICION_SMOOTHING) + s * SUSPICION_SMOOTHING;
        }
    }

    /// Flag a node and apply the penalty.
    ///
    /// Returns `None` for unknown nodes and for nodes already flagged: the
    /// penalty is applied once per flagging event.
    pub fn penalize(&mut self, node: NodeId, factor: f64, tick: u64) -> Option<Penalty> {
        let entry = self.entries.get_mut(&node)?;
        if entry.malicious {
            return None;
        }
        let before = entry.score;
        entry.pre_penalty_score = Some(before);
        entry.score = (before * factor).clamp(0.0, 1.0);
        entry.malicious = true;
        entry.last_penalty_tick = Some(tick);
        entry.clean_ticks = 0;
        Some(Penalty {
            before,
            after: entry.score,
        })
    }

    /// Apply one clean tick of recovery.
    ///
    /// Returns true when this tick cleared the node's malicious flag.
    pub fn recover(&mut self, node: NodeId, tick: u64) -> bool {
        let cooldown = self.curve.cooldown_ticks();
        let Some(entry) = self.entries.get_mut(&node) else {
            return false;
        };
        entry.clean_ticks += 1;
        let ctx = RecoveryContext {
            ticks_since_penalty: entry.last_penalty_tick.map(|t| tick.saturating_sub(t)),
            pre_penalty_score: entry.pre_penalty_score,
            clean_ticks: entry.clean_ticks,
        };
        entry.score = self.curve.recover(entry.score, &ctx).clamp(0.0, 1.0);

        let cooled = ctx.ticks_since_penalty.map_or(true, |t| t >= cooldown);
        if entry.malicious && cooled && entry.score > ELIGIBILITY_THRESHOLD {
            entry.malicious = false;
            return true;
        }
        false
    }

    /// Suspicious but not flagged: no recovery and the clean streak resets.
    pub fn mark_suspicious(&mut self, node: NodeId) {
        if let Some(entry) = self.entries.get_mut(&node) {
            entry.clean_ticks = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const N: NodeId = NodeId(1);

    fn ledger_with(node: NodeId) -> TrustLedger {
        let mut ledger = TrustLedger::new();
        ledger.register(node);
        ledger
    }

    #[test]
    fn new_node_is_neutral() {
        let ledger = ledger_with(N);
        assert_eq!(ledger.score(N), NEUTRAL_TRUST);
        assert!(!ledger.is_malicious(N));
        assert!(ledger.is_authority(N, 0.8));
        assert!(ledger.is_eligible(N));
    }

    #[test]
    fn register_is_idempotent() {
        let mut ledger = ledger_with(N);
        ledger.set_score(N, 0.4);
        assert!(!ledger.register(N));
        assert_eq!(ledger.score(N), 0.4);
    }

    #[test]
    fn unknown_node_is_untrusted() {
        let ledger = TrustLedger::new();
        assert_eq!(ledger.score(NodeId(42)), 0.0);
        assert!(!ledger.is_eligible(NodeId(42)));
    }

    #[test]
    fn penalty_applies_once_per_flagging() {
        let mut ledger = ledger_with(N);
        let p = ledger.penalize(N, DEFAULT_PENALTY_FACTOR, 10).unwrap();
        assert_eq!(p.before, 1.0);
        assert!((p.after - 0.7).abs() < 1e-12);
        assert!(ledger.is_malicious(N));

        // Still flagged: no compounding
        assert!(ledger.penalize(N, DEFAULT_PENALTY_FACTOR, 11).is_none());
        assert!((ledger.score(N) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn flagged_node_is_ineligible_and_not_authority() {
        let mut ledger = ledger_with(N);
        ledger.penalize(N, DEFAULT_PENALTY_FACTOR, 0);
        assert!(!ledger.is_eligible(N));
        assert!(!ledger.is_authority(N, 0.5));
    }

    #[test]
    fn recovery_capped_during_cooldown() {
        let curve = LinearRecovery {
            step: 0.1,
            cooldown_ticks: 10,
            cap_margin: 0.05,
        };
        let mut ledger = TrustLedger::with_curve(curve);
        ledger.register(N);
        ledger.penalize(N, 0.7, 0);

        for tick in 1..10 {
            ledger.recover(N, tick);
            assert!(ledger.score(N) <= 0.95 + 1e-12);
            assert!(ledger.is_malicious(N), "flag must hold during cooldown");
        }

        // Cooldown elapsed: flag clears, cap lifts
        assert!(ledger.recover(N, 10));
        assert!(!ledger.is_malicious(N));
        ledger.recover(N, 11);
        assert!(ledger.score(N) > 0.95);
    }

    #[test]
    fn flag_waits_for_eligibility() {
        let curve = LinearRecovery {
            step: 0.01,
            cooldown_ticks: 0,
            cap_margin: 0.0,
        };
        let mut ledger = TrustLedger::with_curve(curve);
        ledger.register(N);
        ledger.set_score(N, 0.6);
        ledger.penalize(N, 0.7, 0); // 0.42

        let mut tick = 1;
        while ledger.score(N) <= ELIGIBILITY_THRESHOLD {
            assert!(!ledger.recover(N, tick) || ledger.score(N) > ELIGIBILITY_THRESHOLD);
            tick += 1;
        }
        assert!(!ledger.is_malicious(N));
    }

    #[test]
    fn exponential_recovery_closes_gap() {
        let curve = ExponentialRecovery {
            rate: 0.5,
            cooldown_ticks: 0,
            cap_margin: 0.0,
        };
        let ctx = RecoveryContext {
            ticks_since_penalty: None,
            pre_penalty_score: None,
            clean_ticks: 1,
        };
        assert!((curve.recover(0.6, &ctx) - 0.8).abs() < 1e-12);
    }

    #[test]
    fn suspicion_accumulates() {
        let mut ledger = ledger_with(N);
        ledger.record_suspicion(N, 1.0);
        ledger.record_suspicion(N, 1.0);
        let entry = ledger.entry(N).unwrap();
        assert!((entry.suspicion - 0.75).abs() < 1e-12);
        assert_eq!(entry.last_suspicion, 1.0);
    }

    #[test]
    fn policy_serializes_with_tag() {
        let json = serde_json::to_string(&RecoveryPolicy::default()).unwrap();
        assert!(json.contains("\"curve\":\"linear\""));

        let parsed: RecoveryPolicy =
            serde_json::from_str(r#"{"curve":"exponential","rate":0.1,"cooldown_ticks":5,"cap_margin":0.0}"#).unwrap();
        assert_eq!(parsed.cooldown_ticks(), 5);
    }

    proptest! {
        #[test]
        fn trust_stays_in_unit_interval(
            initial in 0.0f64..=1.0,
            factor in 0.0f64..=1.5,
            ops in proptest::collection::vec(0u8..3, 1..60),
        ) {
            let mut ledger = TrustLedger::with_curve(ExponentialRecovery { rate: 0.3, cooldown_ticks: 3, cap_margin: 0.1 });
            ledger.register(N);
            ledger.set_score(N, initial);
            for (tick, op) in ops.into_iter().enumerate() {
                match op {
                    0 => { ledger.penalize(N, factor, tick as u64); }
                    1 => { ledger.recover(N, tick as u64); }
                    _ => ledger.mark_suspicious(N),
                }
                let s = ledger.score(N);
                prop_assert!((0.0..=1.0).contains(&s), "score {} escaped [0,1]", s);
            }
        }
    }
}
