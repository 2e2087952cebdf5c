//! Kinematic feeds.
//!
//! The coordination core does not model mobility. A [`KinematicFeed`] hands
//! it one batch of position and velocity samples per tick, and may announce
//! vehicles that left the road.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use vanet_topology::{KinematicState, KinematicUpdate, NodeId, Position, Velocity};

use crate::error::{Error, Result};

/// Source of per-tick kinematic samples.
pub trait KinematicFeed {
    /// Samples for `tick`. Vehicles absent from the batch keep their last state.
    fn next_tick(&mut self, tick: u64) -> Vec<KinematicUpdate>;

    /// Vehicles that departed before `tick`.
    fn departures(&mut self, _tick: u64) -> Vec<NodeId> {
        Vec::new()
    }
}

impl<F> KinematicFeed for F
where
    F: FnMut(u64) -> Vec<KinematicUpdate>,
{
    fn next_tick(&mut self, tick: u64) -> Vec<KinematicUpdate> {
        self(tick)
    }
}

/// Straight two-way highway with lane-bound traffic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighwayConfig {
    pub vehicles: usize,
    /// Lanes in each direction
    pub lanes_per_direction: usize,
    pub lane_width: f64,
    /// Gap between the two carriageways
    pub median: f64,
    /// Initial distance between consecutive vehicles in a lane
    pub spacing: f64,
    /// Nominal speed in metres per tick
    pub cruise_speed: f64,
    /// Per-tick speed noise, uniform in ±jitter
    pub speed_jitter: f64,
    /// Vehicle that reports displaced positions every other tick
    pub adversary: Option<u64>,
    /// Displacement the adversary reports ahead of its true position
    pub teleport_jump: f64,
}

impl Default for HighwayConfig {
    fn default() -> Self {
        Self {
            vehicles: 24,
            lanes_per_direction: 2,
            lane_width: 4.0,
            median: 12.0,
            spacing: 25.0,
            cruise_speed: 28.0,
            speed_jitter: 0.5,
            adversary: Some(5),
            teleport_jump: 80.0,
        }
    }
}

impl HighwayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lanes_per_direction == 0 {
            return Err(Error::Parameter {
                name: "lanes_per_direction",
                reason: "must be positive",
            });
        }
        for (name, value) in [
            ("lane_width", self.lane_width),
            ("spacing", self.spacing),
            ("cruise_speed", self.cruise_speed),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::Parameter {
                    name,
                    reason: "must be finite and positive",
                });
            }
        }
        for (name, value) in [
            ("median", self.median),
            ("speed_jitter", self.speed_jitter),
            ("teleport_jump", self.teleport_jump),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(Error::Parameter {
                    name,
                    reason: "must be finite and non-negative",
                });
            }
        }
        if self.speed_jitter >= self.cruise_speed {
            return Err(Error::Parameter {
                name: "speed_jitter",
                reason: "must be below cruise_speed",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Vehicle {
    id: NodeId,
    position: Position,
    heading: f64,
}

/// Seeded [`KinematicFeed`] over a [`HighwayConfig`].
///
/// Even lane indices run east, odd ones west. The optional adversary drives
/// like everyone else but reports itself `teleport_jump` metres ahead on odd
/// ticks.
#[derive(Debug, Clone)]
pub struct HighwayFeed {
    config: HighwayConfig,
    rng: StdRng,
    vehicles: Vec<Vehicle>,
}

impl HighwayFeed {
    pub fn new(config: HighwayConfig, seed: u64) -> Self {
        let lanes = config.lanes_per_direction * 2;
        let vehicles = (0..config.vehicles)
            .map(|i| {
                let lane = i % lanes;
                let slot = (i / lanes) as f64;
                let eastbound = lane % 2 == 0;
                let track = (lane / 2) as f64 * config.lane_width;
                let (y, heading) = if eastbound {
                    (track, 0.0)
                } else {
                    (config.median + track, 180.0)
                };
                // Westbound traffic enters from the far end of the same stretch
                let x = if eastbound {
                    slot * config.spacing
                } else {
                    (config.vehicles / lanes) as f64 * config.spacing - slot * config.spacing
                };
                Vehicle {
                    id: NodeId(i as u64),
                    position: Position::new(x, y),
                    heading,
                }
            })
            .collect();
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            vehicles,
        }
    }

    pub fn config(&self) -> &HighwayConfig {
        &self.config
    }

    pub fn adversary(&self) -> Option<NodeId> {
        self.config
            .adversary
            .map(NodeId)
            .filter(|id| self.vehicles.iter().any(|v| v.id == *id))
    }

    pub fn vehicle_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.vehicles.iter().map(|v| v.id)
    }
}

impl KinematicFeed for HighwayFeed {
    fn next_tick(&mut self, tick: u64) -> Vec<KinematicUpdate> {
        let adversary = self.adversary();
        let jitter = self.config.speed_jitter;
        let mut updates = Vec::with_capacity(self.vehicles.len());

        for vehicle in &mut self.vehicles {
            let noise = if jitter > 0.0 {
                self.rng.gen_range(-jitter..=jitter)
            } else {
                0.0
            };
            let velocity = Velocity::from_heading(self.config.cruise_speed + noise, vehicle.heading);
            if tick > 0 {
                vehicle.position = vehicle.position.advance(velocity, 1.0);
            }

            let mut reported = vehicle.position;
            if Some(vehicle.id) == adversary && tick % 2 == 1 {
                reported = reported.advance(Velocity::from_heading(1.0, vehicle.heading), self.config.teleport_jump);
            }
            updates.push(KinematicUpdate::new(vehicle.id, KinematicState::new(reported, velocity)));
        }
        updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn honest(vehicles: usize) -> HighwayConfig {
        HighwayConfig {
            vehicles,
            adversary: None,
            ..HighwayConfig::default()
        }
    }

    #[test]
    fn same_seed_same_traffic() {
        let mut a = HighwayFeed::new(HighwayConfig::default(), 7);
        let mut b = HighwayFeed::new(HighwayConfig::default(), 7);
        for tick in 0..5 {
            assert_eq!(a.next_tick(tick), b.next_tick(tick));
        }
    }

    #[test]
    fn lanes_alternate_direction() {
        let mut feed = HighwayFeed::new(honest(4), 1);
        let updates = feed.next_tick(0);
        assert_eq!(updates.len(), 4);
        assert!(updates[0].state.velocity.vx > 0.0);
        assert!(updates[1].state.velocity.vx < 0.0);
        assert!(updates[2].state.velocity.vx > 0.0);
        assert!(updates[3].state.velocity.vx < 0.0);
    }

    #[test]
    fn honest_vehicles_stay_near_dead_reckoning() {
        let config = honest(8);
        let limit = 2.0 * config.speed_jitter + 1e-9;
        let mut feed = HighwayFeed::new(config, 3);
        let mut previous = feed.next_tick(0);
        for tick in 1..20 {
            let current = feed.next_tick(tick);
            for (p, c) in previous.iter().zip(&current) {
                let jump = p.state.predict(1.0).distance(&c.state.position);
                assert!(jump <= limit, "{} jumped {jump:.2}", c.node);
            }
            previous = current;
        }
    }

    #[test]
    fn adversary_teleports_on_odd_ticks() {
        let config = HighwayConfig {
            vehicles: 8,
            adversary: Some(4),
            speed_jitter: 0.0,
            ..HighwayConfig::default()
        };
        let jump = config.teleport_jump;
        let mut feed = HighwayFeed::new(config, 3);
        assert_eq!(feed.adversary(), Some(NodeId(4)));

        let t0 = feed.next_tick(0)[4].state;
        let t1 = feed.next_tick(1)[4].state;
        assert!((t0.predict(1.0).distance(&t1.position) - jump).abs() < 1e-9);
    }

    #[test]
    fn adversary_must_exist() {
        let config = HighwayConfig {
            vehicles: 3,
            adversary: Some(10),
            ..HighwayConfig::default()
        };
        assert_eq!(HighwayFeed::new(config, 0).adversary(), None);
    }

    #[test]
    fn closures_are_feeds() {
        let mut calls = 0;
        let mut feed = |tick: u64| {
            calls += 1;
            vec![KinematicUpdate::new(
                NodeId(tick),
                KinematicState::new(Position::ORIGIN, Velocity::ZERO),
            )]
        };
        assert_eq!(feed.next_tick(3)[0].node, NodeId(3));
        assert!(feed.departures(3).is_empty());
        drop(feed);
        assert_eq!(calls, 1);
    }

    #[test]
    fn jitter_must_stay_below_cruise() {
        let config = HighwayConfig {
            speed_jitter: 30.0,
            ..HighwayConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
