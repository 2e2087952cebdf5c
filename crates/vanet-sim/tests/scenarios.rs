//! End-to-end scenarios through the full tick pipeline.

use vanet_cluster::{ClusterChange, Role};
use vanet_routing::{Destination, MessageKind, Outgoing, RouteOutcome};
use vanet_sim::{HighwayConfig, HighwayFeed, SimConfig, SimEvent, Simulation, TickReport, TrafficGenerator};
use vanet_topology::{KinematicState, KinematicUpdate, NodeId, Position, Velocity};

const SPACING: f64 = 20.0;
const SPEED: f64 = 20.0;

/// Eastbound convoy, `SPACING` apart, advanced to `tick`.
fn convoy(ids: &[u64], tick: u64) -> Vec<KinematicUpdate> {
    ids.iter()
        .map(|&id| {
            let x = id as f64 * SPACING + SPEED * tick as f64;
            KinematicUpdate::new(NodeId(id), KinematicState::new(Position::new(x, 0.0), Velocity::new(SPEED, 0.0)))
        })
        .collect()
}

fn simulation() -> Simulation {
    Simulation::new(SimConfig::default()).unwrap()
}

fn has_election(report: &TickReport) -> bool {
    report.changes().any(|c| matches!(c, ClusterChange::ElectionHeld { .. }))
}

fn assert_invariants(sim: &Simulation) {
    let config = &sim.config().cluster;
    let fleet = sim.fleet();
    let ledger = sim.ledger();

    for (id, size) in fleet.cluster_sizes() {
        assert!(size >= config.min_cluster_size, "{id} undersized");
        assert!(size <= config.max_cluster_size, "{id} oversized");
    }

    for cluster in fleet.clusters().values() {
        assert!(cluster.radius <= config.max_cluster_radius + 1e-9, "{} too wide", cluster.id);

        for leader in [cluster.leader, cluster.co_leader].into_iter().flatten() {
            assert!(cluster.contains(leader));
            assert!(ledger.is_eligible(leader), "{leader} leads while ineligible");
        }
        if let (Some(l), Some(c)) = (cluster.leader, cluster.co_leader) {
            assert_ne!(l, c);
        }

        let eastbound: Vec<bool> = cluster
            .members
            .iter()
            .map(|&m| fleet.node(m).unwrap().state.velocity.vx > 0.0)
            .collect();
        assert!(eastbound.windows(2).all(|w| w[0] == w[1]), "{} mixes directions", cluster.id);
    }

    for node in fleet.nodes().iter() {
        if let Some(c) = node.cluster {
            assert!(fleet.cluster(c).unwrap().contains(node.id));
        }
        if ledger.is_malicious(node.id) {
            assert_eq!(node.role, Role::Member, "{} flagged but holds {}", node.id, node.role.name());
        }
        if let (Role::Boundary { .. }, Some(c)) = (&node.role, node.cluster) {
            assert!(fleet.cluster(c).unwrap().boundaries.is_boundary(node.id));
        }
    }

    // Every ledger entry belongs to a live vehicle and stays in range
    for entry in ledger.entries() {
        assert!(fleet.node(entry.node).is_some(), "{} tracked after departure", entry.node);
        assert!((0.0..=1.0).contains(&entry.score));
    }
}

#[test]
fn five_vehicle_convoy_elects_central_leader() {
    let mut sim = simulation();
    let report = sim.step(&convoy(&[1, 2, 3, 4, 5], 0));

    assert_eq!(report.clusters, 1);
    assert_eq!(report.elections, 1);
    let cluster = sim.fleet().clusters().values().next().unwrap();
    assert_eq!(cluster.len(), 5);
    assert_eq!(cluster.term, 1);
    assert_eq!(cluster.leader, Some(NodeId(3)));
    // Nodes 2 and 4 are equally central, the lower id wins
    assert_eq!(cluster.co_leader, Some(NodeId(2)));
    assert_eq!(sim.fleet().node(NodeId(3)).unwrap().role, Role::Leader);
    assert_eq!(sim.fleet().node(NodeId(2)).unwrap().role, Role::CoLeader);
    assert_invariants(&sim);
}

#[test]
fn steady_convoy_never_reelects() {
    let ids = [1, 2, 3, 4, 5];
    let mut sim = simulation();
    sim.step(&convoy(&ids, 0));
    for tick in 1..30 {
        let report = sim.step(&convoy(&ids, tick));
        assert!(!has_election(&report), "election at tick {tick}");
        assert_invariants(&sim);
    }
    assert_eq!(sim.fleet().clusters().values().next().unwrap().term, 1);
}

#[test]
fn departed_leader_succeeded_on_next_tick() {
    let mut sim = simulation();
    sim.step(&convoy(&[1, 2, 3, 4, 5], 0));

    assert!(sim.remove_node(NodeId(3)));
    let report = sim.step(&convoy(&[1, 2, 4, 5], 1));

    assert!(report
        .changes()
        .any(|c| matches!(c, ClusterChange::LeaderSucceeded { leader: NodeId(2), .. })));
    assert!(!has_election(&report));
    let cluster = sim.fleet().clusters().values().next().unwrap();
    assert_eq!(cluster.leader, Some(NodeId(2)));
    assert_eq!(cluster.co_leader, None);
    assert_eq!(cluster.term, 1);
    assert_invariants(&sim);

    // Without a standing co-leader the next loss forces an election
    assert!(sim.remove_node(NodeId(2)));
    let report = sim.step(&convoy(&[1, 4, 5], 2));
    assert!(report
        .changes()
        .any(|c| matches!(c, ClusterChange::LeaderVacant { .. })));
    assert!(has_election(&report));
    let cluster = sim.fleet().clusters().values().next().unwrap();
    assert_eq!(cluster.term, 2);
    assert!(cluster.leader.is_some());
    assert!(cluster.co_leader.is_some());
    assert_invariants(&sim);
}

/// Convoy 0..=5 where node 2 reports itself 80 m ahead on odd ticks and
/// floods a stale message while `misbehaving`.
fn adversarial_tick(sim: &mut Simulation, tick: u64, misbehaving: bool) -> TickReport {
    const ADVERSARY: u64 = 2;
    let mut updates = convoy(&[0, 1, 2, 3, 4, 5], tick);
    if misbehaving && tick % 2 == 1 {
        updates[ADVERSARY as usize].state.position.x += 80.0;
        let stale = Outgoing::new(MessageKind::Safety, NodeId(ADVERSARY), Destination::Node(NodeId(0)), 0)
            .with_payload(b"emergency brake".to_vec());
        for _ in 0..20 {
            sim.submit(stale.clone()).unwrap();
        }
    }
    sim.step(&updates)
}

#[test]
fn teleporting_spammer_flagged_and_replaced() {
    let adversary = NodeId(2);
    let mut sim = simulation();

    adversarial_tick(&mut sim, 0, true);
    // Nodes 2 and 3 are equally central, so the adversary leads at first
    let cluster = sim.fleet().clusters().values().next().unwrap();
    assert_eq!(cluster.leader, Some(adversary));
    assert_eq!(cluster.co_leader, Some(NodeId(3)));

    let report = adversarial_tick(&mut sim, 1, true);
    let flagging = report
        .events
        .iter()
        .find_map(|e| match e {
            SimEvent::NodeFlagged { flagging, .. } => Some(*flagging),
            _ => None,
        })
        .expect("adversary flagged");
    assert_eq!(flagging.node, adversary);
    assert_eq!(flagging.authorities, 5);
    assert_eq!(flagging.concurring, 5);
    assert!((flagging.trust_after - 0.7).abs() < 1e-9);

    // Flagging and succession happen in the same tick
    assert!(report
        .changes()
        .any(|c| matches!(c, ClusterChange::LeaderSucceeded { leader: NodeId(3), .. })));
    assert!(sim.ledger().is_malicious(adversary));
    assert_eq!(sim.fleet().node(adversary).unwrap().role, Role::Member);
    assert_invariants(&sim);

    // Further evidence does not compound the penalty
    let report = adversarial_tick(&mut sim, 3, true);
    assert_eq!(report.flagged, 0);
    assert!(sim.ledger().score(adversary) <= 0.7 + 1e-9);
}

#[test]
fn reformed_node_cleared_after_cooldown() {
    let adversary = NodeId(2);
    let mut sim = simulation();
    adversarial_tick(&mut sim, 0, true);
    adversarial_tick(&mut sim, 1, true);
    assert!(sim.ledger().is_malicious(adversary));

    let mut cleared_at = None;
    for tick in 2..30 {
        let report = adversarial_tick(&mut sim, tick, false);
        assert_invariants(&sim);
        if report
            .events
            .iter()
            .any(|e| matches!(e, SimEvent::FlagCleared { node, .. } if *node == adversary))
        {
            cleared_at = Some(tick);
            break;
        }
        assert!(sim.ledger().is_malicious(adversary));
    }

    // Penalised at tick 1
    let cooldown = sim.ledger().curve().cooldown_ticks();
    assert_eq!(cooldown, 20);
    assert_eq!(cleared_at, Some(1 + cooldown));
    assert!(!sim.ledger().is_malicious(adversary));
    assert!(sim.ledger().is_eligible(adversary));
}

#[test]
fn lone_misbehaving_vehicle_is_never_flagged() {
    let mut sim = simulation();
    let far = |tick: u64, jump: f64| {
        KinematicUpdate::new(
            NodeId(99),
            KinematicState::new(Position::new(5_000.0 + SPEED * tick as f64 + jump, 0.0), Velocity::new(SPEED, 0.0)),
        )
    };
    let stale = Outgoing::new(MessageKind::Safety, NodeId(99), Destination::Node(NodeId(0)), 0);
    for tick in 0..6 {
        if tick > 0 {
            for _ in 0..20 {
                sim.submit(stale.clone()).unwrap();
            }
        }
        let mut updates = convoy(&[0, 1, 2], tick);
        updates.push(far(tick, if tick % 2 == 1 { 80.0 } else { 0.0 }));
        let report = sim.step(&updates);
        assert_eq!(report.flagged, 0);
    }
    // Suspicious, but there is no authority panel outside a cluster
    assert!(sim.ledger().entry(NodeId(99)).unwrap().last_suspicion >= 0.5);
    assert!(sim.fleet().node(NodeId(99)).unwrap().cluster.is_none());
    assert!(!sim.ledger().is_malicious(NodeId(99)));
}

#[test]
fn safety_traffic_routed_first() {
    let mut sim = simulation();
    sim.step(&convoy(&[1, 2, 3], 0));

    let info = Outgoing::new(MessageKind::Info, NodeId(1), Destination::Node(NodeId(3)), 1);
    let safety = Outgoing::new(MessageKind::Safety, NodeId(1), Destination::Node(NodeId(3)), 2);
    sim.submit(info).unwrap();
    sim.submit(safety).unwrap();

    let report = sim.step(&convoy(&[1, 2, 3], 1));
    let kinds: Vec<MessageKind> = report
        .routed()
        .map(|o| match o {
            RouteOutcome::Delivered { kind, .. } | RouteOutcome::Dropped { kind, .. } => *kind,
        })
        .collect();
    assert_eq!(kinds, vec![MessageKind::Safety, MessageKind::Info]);
    assert_eq!(report.delivered, 2);
}

#[test]
fn cluster_multicast_reaches_every_member() {
    let mut sim = simulation();
    sim.step(&convoy(&[1, 2, 3, 4], 0));
    let cluster = sim.fleet().cluster_of(NodeId(1)).unwrap().id;

    sim.submit(Outgoing::new(MessageKind::Control, NodeId(1), Destination::Cluster(cluster), 1))
        .unwrap();
    let report = sim.step(&convoy(&[1, 2, 3, 4], 1));

    let outcome = report.routed().next().unwrap();
    match outcome {
        RouteOutcome::Delivered { recipients, missed, .. } => {
            assert_eq!(recipients, &vec![NodeId(2), NodeId(3), NodeId(4)]);
            assert!(missed.is_empty());
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn opposite_carriageways_stay_apart_on_the_highway() {
    let config = SimConfig::default();
    let mut sim = Simulation::new(config.clone()).unwrap();
    let mut feed = HighwayFeed::new(config.highway.clone(), config.seed);
    let mut traffic = TrafficGenerator::new(config.traffic.clone(), config.seed, feed.adversary());

    for _ in 0..60 {
        for outgoing in traffic.generate(sim.fleet()) {
            sim.submit(outgoing).unwrap();
        }
        let mut batch = sim.run(&mut feed, 1);
        let report = batch.pop().unwrap();
        assert_eq!(report.nodes, config.highway.vehicles);
        assert_invariants(&sim);
    }

    let stats = sim.stats();
    assert_eq!(stats.ticks, 60);
    assert!(stats.clusters_formed >= 2);
    assert!(stats.router.submitted > 0);
}

#[test]
fn same_seed_same_run() {
    let run = || {
        let config = SimConfig {
            highway: HighwayConfig {
                vehicles: 16,
                ..HighwayConfig::default()
            },
            ..SimConfig::default()
        };
        let mut sim = Simulation::new(config.clone()).unwrap();
        let mut feed = HighwayFeed::new(config.highway.clone(), config.seed);
        sim.run(&mut feed, 25)
            .into_iter()
            .flat_map(|r| r.events)
            .collect::<Vec<SimEvent>>()
    };
    assert_eq!(run(), run());
}

#[test]
fn snapshot_serializes() {
    let mut sim = simulation();
    sim.step(&convoy(&[1, 2, 3, 4, 5], 0));
    let json = serde_json::to_value(sim.snapshot()).unwrap();
    assert_eq!(json["clusters"][0]["leader"], 3);
    assert_eq!(json["nodes"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn subscribers_see_every_tick_event() {
    let mut sim = simulation();
    let mut rx = sim.subscribe();
    let report = sim.step(&convoy(&[1, 2, 3], 0));

    let mut received = Vec::new();
    for _ in 0..report.events.len() {
        received.push(rx.recv().await.unwrap());
    }
    assert_eq!(received, report.events);
    assert!(rx.try_recv().is_err());
}
