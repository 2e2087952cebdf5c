//! Synthetic V2V traffic for the demo driver.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use vanet_cluster::Fleet;
use vanet_routing::{Destination, MessageKind, Outgoing};
use vanet_topology::NodeId;

use crate::error::{Error, Result};

/// Shape of the generated traffic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    pub messages_per_tick: usize,
    /// Share of messages sent as safety traffic
    pub safety_share: f64,
    /// Share of messages sent as control traffic
    pub control_share: f64,
    /// Share of messages addressed to the sender's own cluster
    pub multicast_share: f64,
    pub payload_len: usize,
    /// Copies of one stale message the adversary floods per tick
    pub adversary_copies: u32,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            messages_per_tick: 6,
            safety_share: 0.2,
            control_share: 0.3,
            multicast_share: 0.5,
            payload_len: 32,
            adversary_copies: 20,
        }
    }
}

impl TrafficConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("safety_share", self.safety_share),
            ("control_share", self.control_share),
            ("multicast_share", self.multicast_share),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Parameter {
                    name,
                    reason: "must lie in [0, 1]",
                });
            }
        }
        if self.safety_share + self.control_share > 1.0 {
            return Err(Error::Parameter {
                name: "control_share",
                reason: "safety and control shares exceed 1",
            });
        }
        Ok(())
    }
}

/// Seeded message generator.
///
/// Honest senders number their messages sequentially. The adversary, if
/// present, resends one message over and over, which the router sees as
/// replays.
#[derive(Debug, Clone)]
pub struct TrafficGenerator {
    config: TrafficConfig,
    rng: StdRng,
    sequences: BTreeMap<NodeId, u64>,
    adversary: Option<NodeId>,
}

impl TrafficGenerator {
    pub fn new(config: TrafficConfig, seed: u64, adversary: Option<NodeId>) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            sequences: BTreeMap::new(),
            adversary,
        }
    }

    /// Messages to submit before the next tick.
    pub fn generate(&mut self, fleet: &Fleet) -> Vec<Outgoing> {
        let ids: Vec<NodeId> = fleet.nodes().ids().collect();
        let mut batch = Vec::new();
        if ids.len() < 2 {
            return batch;
        }

        for _ in 0..self.config.messages_per_tick {
            let Some(&sender) = ids.choose(&mut self.rng) else {
                break;
            };
            let cluster = fleet.node(sender).and_then(|n| n.cluster);
            let destination = match cluster {
                Some(c) if self.rng.gen_bool(self.config.multicast_share) => Destination::Cluster(c),
                _ => {
                    let others: Vec<NodeId> = ids.iter().copied().filter(|&n| n != sender).collect();
                    match others.choose(&mut self.rng) {
                        Some(&n) => Destination::Node(n),
                        None => continue,
                    }
                }
            };

            let roll: f64 = self.rng.gen();
            let kind = if roll < self.config.safety_share {
                MessageKind::Safety
            } else if roll < self.config.safety_share + self.config.control_share {
                MessageKind::Control
            } else {
                MessageKind::Info
            };

            let sequence = self.sequences.entry(sender).or_insert(0);
            *sequence += 1;
            let payload: Vec<u8> = (0..self.config.payload_len).map(|_| self.rng.gen()).collect();
            batch.push(Outgoing::new(kind, sender, destination, *sequence).with_payload(payload));
        }

        if let Some(adversary) = self.adversary.filter(|&a| fleet.nodes().contains(a)) {
            let stale = Outgoing::new(
                MessageKind::Safety,
                adversary,
                Destination::Node(ids.iter().copied().find(|&n| n != adversary).unwrap_or(adversary)),
                0,
            )
            .with_payload(b"emergency brake".to_vec());
            batch.extend(std::iter::repeat(stale).take(self.config.adversary_copies as usize));
        }
        batch
    }
}
