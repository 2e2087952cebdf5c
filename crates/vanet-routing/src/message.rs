//! V2V messages and their digests.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use vanet_cluster::ClusterId;
use vanet_topology::NodeId;

/// Message class. Safety traffic is always delivered first.
///
/// Declaration order is priority order, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Info,
    Control,
    Safety,
}

impl MessageKind {
    pub fn name(&self) -> &'static str {
        match self {
            MessageKind::Info => "info",
            MessageKind::Control => "control",
            MessageKind::Safety => "safety",
        }
    }
}

/// Where a message is going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    /// A single vehicle
    Node(NodeId),
    /// Every member of a cluster except the sender
    Cluster(ClusterId),
}

/// Router-assigned message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// A 32-byte Blake3 digest of a message's identifying content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    /// Digest of everything the sender controls. Two submissions with the
    /// same digest are the same message.
    pub fn of(outgoing: &Outgoing) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&outgoing.sender.0.to_be_bytes());
        hasher.update(&outgoing.sequence.to_be_bytes());
        hasher.update(outgoing.kind.name().as_bytes());
        match outgoing.destination {
            Destination::Node(n) => {
                hasher.update(b"node:");
                hasher.update(&n.0.to_be_bytes());
            }
            Destination::Cluster(c) => {
                hasher.update(b"cluster:");
                hasher.update(&c.0.to_be_bytes());
            }
        }
        hasher.update(&outgoing.payload);
        Self(*hasher.finalize().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First 8 hex chars
        write!(f, "{}", &self.to_hex()[..8])
    }
}

/// A message as handed over by the application layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outgoing {
    pub kind: MessageKind,
    pub sender: NodeId,
    pub destination: Destination,
    /// Sender-local sequence number
    pub sequence: u64,
    pub payload: Vec<u8>,
    /// Hop budget; the router default applies when absent
    #[serde(default)]
    pub ttl: Option<u32>,
}

impl Outgoing {
    pub fn new(kind: MessageKind, sender: NodeId, destination: Destination, sequence: u64) -> Self {
        Self {
            kind,
            sender,
            destination,
            sequence,
            payload: Vec::new(),
            ttl: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// A message in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub kind: MessageKind,
    pub sender: NodeId,
    pub destination: Destination,
    pub sequence: u64,
    pub payload: Vec<u8>,
    pub digest: Digest,
    /// Remaining hop budget
    pub ttl: u32,
    /// Hops taken so far
    pub hops: u32,
    /// Nodes that already carried this message
    pub visited: BTreeSet<NodeId>,
    /// Tick the message entered the router
    pub submitted_at: u64,
}

impl Message {
    pub(crate) fn new(id: MessageId, outgoing: Outgoing, digest: Digest, ttl: u32, tick: u64) -> Self {
        Self {
            id,
            kind: outgoing.kind,
            sender: outgoing.sender,
            destination: outgoing.destination,
            sequence: outgoing.sequence,
            payload: outgoing.payload,
            digest,
            ttl,
            hops: 0,
            visited: BTreeSet::new(),
            submitted_at: tick,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outgoing(sequence: u64) -> Outgoing {
        Outgoing::new(MessageKind::Safety, NodeId(1), Destination::Node(NodeId(2)), sequence)
            .with_payload(b"brake".to_vec())
    }

    #[test]
    fn priority_order() {
        assert!(MessageKind::Safety > MessageKind::Control);
        assert!(MessageKind::Control > MessageKind::Info);
    }

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(Digest::of(&outgoing(1)), Digest::of(&outgoing(1)));
    }

    #[test]
    fn digest_covers_sequence_and_destination() {
        assert_ne!(Digest::of(&outgoing(1)), Digest::of(&outgoing(2)));

        let mut other = outgoing(1);
        other.destination = Destination::Cluster(ClusterId(2));
        assert_ne!(Digest::of(&outgoing(1)), Digest::of(&other));
    }

    #[test]
    fn digest_display_is_short_hex() {
        let digest = Digest::of(&outgoing(1));
        assert_eq!(digest.to_string().len(), 8);
        assert!(digest.to_hex().starts_with(&digest.to_string()));
    }

    #[test]
    fn outgoing_ttl_is_optional_in_json() {
        let json = r#"{"kind":"info","sender":3,"destination":{"cluster":1},"sequence":7,"payload":[]}"#;
        let parsed: Outgoing = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.ttl, None);
        assert_eq!(parsed.destination, Destination::Cluster(ClusterId(1)));
    }
}
