//! Best-effort priority router.
//!
//! Messages queue by class (safety, then control, then info) and by arrival
//! within a class. Each tick the router drains up to its budget and floods
//! every message hop by hop: the sender transmits to its radio neighbours,
//! and only forwarding nodes (leader, co-leader, relay, boundary) carry it
//! further. The visited set keeps a node from handling a message twice and
//! every hop spends one unit of time-to-live. A message that cannot reach its
//! destination is dropped, never retried.
//!
//! Submissions are deduplicated by digest over a sliding window. Repeats are
//! dropped and counted against the sender as replays.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use vanet_consensus::TrafficSample;
use vanet_topology::NodeId;

use crate::error::{Error, Result};
use crate::message::{Destination, Digest, Message, MessageId, MessageKind, Outgoing};
use crate::view::RoutingView;

/// Router limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Hop budget for messages that do not set one
    pub default_ttl: u32,
    /// Digests remembered for replay detection
    pub replay_window: usize,
    /// Messages routed per tick; the rest wait in priority order
    pub per_tick_budget: usize,
    pub max_payload: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_ttl: 8,
            replay_window: 4096,
            per_tick_budget: 512,
            max_payload: 1024,
        }
    }
}

impl RouterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_ttl == 0 {
            return Err(Error::ZeroLimit("default_ttl"));
        }
        if self.replay_window == 0 {
            return Err(Error::ZeroLimit("replay_window"));
        }
        if self.per_tick_budget == 0 {
            return Err(Error::ZeroLimit("per_tick_budget"));
        }
        Ok(())
    }
}

/// Why a message was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Hop budget spent before reaching the destination
    TtlExpired,
    /// No forwarding path to the destination
    Unreachable,
    /// Digest seen before
    Duplicate,
    /// Sender left the fleet before delivery
    UnknownSender,
    /// Destination node or cluster does not exist
    UnknownDestination,
}

/// Result of routing one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RouteOutcome {
    Delivered {
        message: MessageId,
        kind: MessageKind,
        sender: NodeId,
        destination: Destination,
        recipients: Vec<NodeId>,
        /// Cluster members the flood did not reach
        missed: Vec<NodeId>,
        hops: u32,
    },
    Dropped {
        message: MessageId,
        kind: MessageKind,
        sender: NodeId,
        reason: DropReason,
    },
}

impl RouteOutcome {
    pub fn message(&self) -> MessageId {
        match self {
            RouteOutcome::Delivered { message, .. } | RouteOutcome::Dropped { message, .. } => *message,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, RouteOutcome::Delivered { .. })
    }
}

/// What happened to a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Queued(MessageId),
    /// Dropped as a replay; reported with the next delivery pass
    Duplicate(MessageId),
}

/// Cumulative router counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterStats {
    pub submitted: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub duplicates: u64,
}

impl RouterStats {
    /// Delivered share of finished messages, `None` before any finished.
    pub fn delivery_ratio(&self) -> Option<f64> {
        let finished = self.delivered + self.dropped;
        (finished > 0).then(|| self.delivered as f64 / finished as f64)
    }
}

/// Heap entry: higher class first, then earlier arrival.
#[derive(Debug)]
struct Queued {
    message: Message,
}

impl Queued {
    fn key(&self) -> (MessageKind, std::cmp::Reverse<MessageId>) {
        (self.message.kind, std::cmp::Reverse(self.message.id))
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Sliding window of recently seen digests.
#[derive(Debug, Default)]
struct ReplayWindow {
    order: VecDeque<Digest>,
    seen: HashSet<Digest>,
    capacity: usize,
}

impl ReplayWindow {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Remember a digest. Returns false if it was already in the window.
    fn admit(&mut self, digest: Digest) -> bool {
        if !self.seen.insert(digest) {
            return false;
        }
        self.order.push_back(digest);
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.seen.remove(&old);
            }
        }
        true
    }
}

/// Priority queue, replay filter and flooding delivery.
#[derive(Debug)]
pub struct MessageRouter {
    config: RouterConfig,
    queue: BinaryHeap<Queued>,
    replays: ReplayWindow,
    next_id: u64,
    traffic: BTreeMap<NodeId, TrafficSample>,
    rejected: Vec<RouteOutcome>,
    stats: RouterStats,
}

impl MessageRouter {
    pub fn new(config: RouterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            replays: ReplayWindow::new(config.replay_window),
            config,
            queue: BinaryHeap::new(),
            next_id: 0,
            traffic: BTreeMap::new(),
            rejected: Vec::new(),
            stats: RouterStats::default(),
        })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    /// Messages waiting for delivery.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Accept a message from the application layer.
    pub fn submit(&mut self, outgoing: Outgoing, tick: u64) -> Result<Admission> {
        if outgoing.payload.len() > self.config.max_payload {
            return Err(Error::PayloadTooLarge {
                len: outgoing.payload.len(),
                max: self.config.max_payload,
            });
        }
        let ttl = outgoing.ttl.unwrap_or(self.config.default_ttl);
        if ttl == 0 {
            return Err(Error::ZeroTtl {
                sender: outgoing.sender,
            });
        }

        self.next_id += 1;
        let id = MessageId(self.next_id);
        let digest = Digest::of(&outgoing);
        let sender = outgoing.sender;
        let traffic = self.traffic.entry(sender).or_default();
        traffic.sent += 1;
        self.stats.submitted += 1;

        if !self.replays.admit(digest) {
            traffic.replayed += 1;
            self.stats.duplicates += 1;
            self.stats.dropped += 1;
            debug!(message = %id, %sender, %digest, "replayed message dropped");
            self.rejected.push(RouteOutcome::Dropped {
                message: id,
                kind: outgoing.kind,
                sender,
                reason: DropReason::Duplicate,
            });
            return Ok(Admission::Duplicate(id));
        }

        trace!(message = %id, %sender, kind = outgoing.kind.name(), %digest, "message queued");
        self.queue.push(Queued {
            message: Message::new(id, outgoing, digest, ttl, tick),
        });
        Ok(Admission::Queued(id))
    }

    /// Per-sender traffic since the last call.
    pub fn take_traffic(&mut self) -> BTreeMap<NodeId, TrafficSample> {
        std::mem::take(&mut self.traffic)
    }

    /// Route queued messages in priority order, up to the per-tick budget.
    ///
    /// Replays rejected since the previous pass are reported first.
    pub fn deliver<V: RoutingView>(&mut self, view: &V) -> Vec<RouteOutcome> {
        let mut outcomes = std::mem::take(&mut self.rejected);
        for _ in 0..self.config.per_tick_budget {
            let Some(Queued { message }) = self.queue.pop() else {
                break;
            };
            let outcome = route(message, view);
            match &outcome {
                RouteOutcome::Delivered { message, hops, recipients, .. } => {
                    self.stats.delivered += 1;
                    debug!(%message, hops, recipients = recipients.len(), "message delivered");
                }
                RouteOutcome::Dropped { message, reason, .. } => {
                    self.stats.dropped += 1;
                    debug!(%message, ?reason, "message dropped");
                }
            }
            outcomes.push(outcome);
        }
        outcomes
    }
}

/// Flood one message through the forwarding nodes of `view`.
fn route<V: RoutingView>(mut message: Message, view: &V) -> RouteOutcome {
    let dropped = |message: &Message, reason| RouteOutcome::Dropped {
        message: message.id,
        kind: message.kind,
        sender: message.sender,
        reason,
    };

    if !view.contains(message.sender) {
        return dropped(&message, DropReason::UnknownSender);
    }

    let mut remaining: BTreeSet<NodeId> = match message.destination {
        Destination::Node(target) if !view.contains(target) => {
            return dropped(&message, DropReason::UnknownDestination);
        }
        Destination::Node(target) => BTreeSet::from([target]),
        Destination::Cluster(cluster) => match view.members(cluster) {
            Some(members) => members.into_iter().collect(),
            None => return dropped(&message, DropReason::UnknownDestination),
        },
    };

    let mut reached: BTreeSet<NodeId> = BTreeSet::new();
    // A sender addressing itself or its own cluster already holds the message
    if remaining.remove(&message.sender) && matches!(message.destination, Destination::Node(_)) {
        reached.insert(message.sender);
    }

    message.visited.insert(message.sender);
    let mut frontier = vec![message.sender];

    while !remaining.is_empty() && !frontier.is_empty() && message.ttl > 0 {
        message.ttl -= 1;
        message.hops += 1;

        let mut next = Vec::new();
        for carrier in frontier {
            for &n in view.neighbors(carrier) {
                if !message.visited.insert(n) {
                    continue;
                }
                if remaining.remove(&n) {
                    reached.insert(n);
                }
                if view.can_forward(n) {
                    next.push(n);
                }
            }
        }
        frontier = next;
    }

    if remaining.is_empty() || !reached.is_empty() {
        return RouteOutcome::Delivered {
            message: message.id,
            kind: message.kind,
            sender: message.sender,
            destination: message.destination,
            recipients: reached.into_iter().collect(),
            missed: remaining.into_iter().collect(),
            hops: message.hops,
        };
    }

    let reason = if frontier.is_empty() {
        DropReason::Unreachable
    } else {
        DropReason::TtlExpired
    };
    dropped(&message, reason)
}
