//! The tick pipeline.
//!
//! Each [`Simulation::step`] runs, in order:
//!
//! 0. ingest: sanity-check the kinematic samples and register new vehicles
//! 1. membership: formation, merge, split, dissolve
//! 2. detection: anomaly features, authority reports, trust updates
//! 3. leadership: co-leader succession and failure-driven elections
//! 4. roles: relay and boundary election
//! 5. delivery: route queued messages over the refreshed roles
//!
//! Suspicion is scored once per vehicle per tick from its own kinematics and
//! traffic. Every authority within radio range of a vehicle reports that same
//! score, so the quorum measures how many authorities can hear the vehicle,
//! not how many reached the verdict on their own.
//!
//! A phase only reads state finalized by the phases before it. Messages
//! submitted between ticks, and departures announced between ticks, are
//! handled by the next step.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};
use vanet_cluster::{ClusterChange, ClusterManager, Fleet};
use vanet_consensus::{
    AnomalyFeatures, Assessment, PassOutcome, PoADetector, SuspicionReport, TrafficSample, TrustLedger,
};
use vanet_routing::{Admission, FleetView, MessageRouter, Outgoing};
use vanet_topology::{KinematicUpdate, NeighborTable, NodeId};

use crate::config::SimConfig;
use crate::error::{Error, Result};
use crate::events::{FleetSnapshot, SimEvent, SimStats, TickReport};
use crate::feed::KinematicFeed;
use crate::stream::EventStream;

/// One authority panel: the members it judges and the authorities on it.
struct Panel {
    assessments: Vec<Assessment>,
    authorities: Vec<NodeId>,
}

/// Deterministic VANET coordination core driven one tick at a time.
pub struct Simulation {
    config: SimConfig,
    tick: u64,
    fleet: Fleet,
    ledger: TrustLedger,
    manager: ClusterManager,
    detector: PoADetector,
    router: MessageRouter,
    stream: EventStream,
    /// Events raised between ticks, published with the next step
    pending: Vec<SimEvent>,
    stats: SimStats,
}

impl Simulation {
    /// Create a new simulation with the given configuration.
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            tick: 0,
            fleet: Fleet::new(),
            ledger: TrustLedger::with_curve(config.recovery),
            manager: ClusterManager::new(config.cluster.clone())?,
            detector: PoADetector::new(config.poa),
            router: MessageRouter::new(config.router.clone())?,
            stream: EventStream::new(config.event_capacity),
            pending: Vec::new(),
            stats: SimStats::default(),
            config,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The tick the next [`Simulation::step`] will run.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    pub fn ledger(&self) -> &TrustLedger {
        &self.ledger
    }

    pub fn stats(&self) -> SimStats {
        SimStats {
            router: self.router.stats(),
            ..self.stats
        }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SimEvent> {
        self.stream.subscribe()
    }

    pub fn snapshot(&self) -> FleetSnapshot {
        FleetSnapshot::capture(
            self.tick,
            &self.fleet,
            &self.ledger,
            self.detector.config().authority_threshold,
        )
    }

    /// Queue a message for the next delivery phase.
    pub fn submit(&mut self, outgoing: Outgoing) -> Result<Admission> {
        if !self.fleet.nodes().contains(outgoing.sender) {
            return Err(Error::UnknownSender(outgoing.sender));
        }
        Ok(self.router.submit(outgoing, self.tick)?)
    }

    /// Remove a vehicle from the fleet and the trust ledger.
    ///
    /// Roles it held are vacated at once; a departed leader is succeeded in
    /// the leadership phase of the next step.
    pub fn remove_node(&mut self, node: NodeId) -> bool {
        let Some(removed) = self.fleet.remove_node(node) else {
            return false;
        };
        self.ledger.remove(node);
        self.stats.departures += 1;
        info!(%node, cluster = ?removed.cluster, "node departed");
        self.pending.push(SimEvent::NodeDeparted {
            node,
            cluster: removed.cluster,
            tick: self.tick,
        });
        true
    }

    /// Drive `ticks` steps from a feed.
    pub fn run<F: KinematicFeed>(&mut self, feed: &mut F, ticks: u64) -> Vec<TickReport> {
        (0..ticks)
            .map(|_| {
                for node in feed.departures(self.tick) {
                    self.remove_node(node);
                }
                let updates = feed.next_tick(self.tick);
                self.step(&updates)
            })
            .collect()
    }

    /// Run one tick of the pipeline.
    pub fn step(&mut self, updates: &[KinematicUpdate]) -> TickReport {
        let tick = self.tick;
        let mut events = std::mem::take(&mut self.pending);

        // Phase 0: ingest
        let updated = self.ingest(tick, updates, &mut events);
        let table = self.fleet.neighbor_table(self.config.cluster.dsrc_range);

        // Phase 1: membership
        let changes = self.manager.update_membership(&mut self.fleet, tick);
        self.record_changes(changes, tick, &mut events);

        // Phase 2: detection
        let mut flagged = 0;
        for outcome in self.detect(tick, &updated, &table) {
            for flagging in outcome.flagged {
                self.fleet.demote(flagging.node);
                flagged += 1;
                events.push(SimEvent::NodeFlagged { flagging, tick });
            }
            for node in outcome.cleared {
                info!(%node, trust = self.ledger.score(node), "node cleared");
                events.push(SimEvent::FlagCleared {
                    node,
                    trust: self.ledger.score(node),
                    tick,
                });
            }
        }

        self.stats.flagged += flagged as u64;

        // Phase 3: leadership
        let changes = self.manager.resolve_leadership(&mut self.fleet, &self.ledger, &table, tick);
        let elections = self.record_changes(changes, tick, &mut events);

        // Phase 4: relays and boundaries
        let changes = self.manager.refresh_roles(&mut self.fleet, &self.ledger, &table);
        self.record_changes(changes, tick, &mut events);

        // Phase 5: delivery
        let outcomes = {
            let view = FleetView::new(&self.fleet, &table, &self.ledger);
            self.router.deliver(&view)
        };
        let delivered = outcomes.iter().filter(|o| o.is_delivered()).count();
        let dropped = outcomes.len() - delivered;
        events.extend(outcomes.into_iter().map(|outcome| SimEvent::Message { outcome, tick }));

        self.stream.publish(&events);
        self.stats.ticks += 1;
        self.stats.events += events.len() as u64;
        self.tick += 1;

        let report = TickReport {
            tick,
            nodes: self.fleet.nodes().len(),
            clusters: self.fleet.clusters().len(),
            unclustered: self.fleet.nodes().unclustered().count(),
            elections,
            flagged,
            delivered,
            dropped,
            pending_messages: self.router.pending(),
            events,
        };
        debug!(
            tick,
            nodes = report.nodes,
            clusters = report.clusters,
            elections,
            flagged,
            delivered,
            dropped,
            "tick complete"
        );
        report
    }

    /// Apply valid samples. Returns the nodes that reported this tick.
    fn ingest(&mut self, tick: u64, updates: &[KinematicUpdate], events: &mut Vec<SimEvent>) -> BTreeSet<NodeId> {
        let mut updated = BTreeSet::new();
        for update in updates {
            if let Err(e) = update.validate(self.config.max_speed) {
                warn!(node = %update.node, error = %e, "kinematic update rejected");
                self.stats.rejected_updates += 1;
                events.push(SimEvent::UpdateRejected {
                    node: update.node,
                    reason: e.to_string(),
                    tick,
                });
                continue;
            }
            // Later samples for the same node in one batch win
            if self.fleet.observe(update, tick) {
                self.ledger.register(update.node);
                self.stats.nodes_seen += 1;
                debug!(node = %update.node, position = %update.state.position, "node appeared");
                events.push(SimEvent::NodeAppeared {
                    node: update.node,
                    position: update.state.position,
                    tick,
                });
            }
            updated.insert(update.node);
        }
        updated
    }

    /// Score every node and run one detection pass per cluster, plus one for
    /// the unclustered pool, which has no authority panel and is never flagged.
    fn detect(&mut self, tick: u64, updated: &BTreeSet<NodeId>, table: &NeighborTable) -> Vec<PassOutcome> {
        let mut traffic = self.router.take_traffic();
        let limits = self.detector.config().limits;

        let suspicion: BTreeMap<NodeId, f64> = self
            .fleet
            .nodes()
            .iter()
            .map(|node| {
                // Nodes that did not report this tick have no fresh kinematics
                let previous = node.previous.as_ref().filter(|_| updated.contains(&node.id));
                let sample: TrafficSample = traffic.remove(&node.id).unwrap_or_default();
                let features = AnomalyFeatures::observe(previous, &node.state, sample, &limits);
                (node.id, self.detector.suspicion(&features))
            })
            .collect();
        let score = |node: NodeId| suspicion.get(&node).copied().unwrap_or(0.0);

        // Panels are fixed before any trust changes
        let mut panels: Vec<Panel> = self
            .fleet
            .clusters()
            .values()
            .map(|cluster| Panel {
                assessments: cluster
                    .members
                    .iter()
                    .map(|&node| Assessment {
                        node,
                        suspicion: score(node),
                    })
                    .collect(),
                authorities: self.detector.authorities(&self.ledger, cluster.members.iter()),
            })
            .collect();
        panels.push(Panel {
            assessments: self
                .fleet
                .nodes()
                .unclustered()
                .map(|n| Assessment {
                    node: n.id,
                    suspicion: score(n.id),
                })
                .collect(),
            authorities: Vec::new(),
        });

        panels
            .into_iter()
            .map(|panel| {
                // Authorities report the shared score of every vehicle they can hear
                let reports: Vec<SuspicionReport> = panel
                    .authorities
                    .iter()
                    .flat_map(|&observer| {
                        table.neighbors(observer).iter().map(move |&subject| SuspicionReport {
                            observer,
                            subject,
                            suspicion: score(subject),
                        })
                    })
                    .collect();
                self.detector
                    .run_pass(&mut self.ledger, tick, &panel.assessments, &panel.authorities, &reports)
            })
            .collect()
    }

    /// Count and emit cluster changes. Returns the number of elections among them.
    fn record_changes(&mut self, changes: Vec<ClusterChange>, tick: u64, events: &mut Vec<SimEvent>) -> usize {
        let mut elections = 0;
        for change in changes {
            match change {
                ClusterChange::Formed { .. } => self.stats.clusters_formed += 1,
                ClusterChange::Merged { .. } => self.stats.merges += 1,
                ClusterChange::Split { .. } => self.stats.splits += 1,
                ClusterChange::ElectionHeld { .. } => elections += 1,
                ClusterChange::LeaderSucceeded { .. } => self.stats.successions += 1,
                _ => {}
            }
            events.push(SimEvent::Cluster { change, tick });
        }
        self.stats.elections += elections as u64;
        elections
    }
}
