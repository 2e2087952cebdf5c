//! VANET Coordination Simulation
//!
//! Wires topology, trust, clustering and routing into one deterministic tick
//! pipeline ([`Simulation`]) and exposes what happens as a stream of
//! [`SimEvent`]s.
//!
//! # Example
//!
//! ```
//! use vanet_sim::{HighwayConfig, HighwayFeed, SimConfig, Simulation};
//!
//! let config = SimConfig::default();
//! let mut sim = Simulation::new(config.clone()).unwrap();
//! let mut feed = HighwayFeed::new(HighwayConfig { adversary: None, ..config.highway }, config.seed);
//! let reports = sim.run(&mut feed, 5);
//! assert_eq!(reports.len(), 5);
//! assert!(reports[0].clusters > 0);
//! ```

mod config;
mod error;
mod events;
mod simulation;
mod stream;

pub mod feed;
pub mod traffic;

pub use config::SimConfig;
pub use error::{Error, Result};
pub use events::{ClusterSnapshot, FleetSnapshot, NodeSnapshot, SimEvent, SimStats, TickReport};
pub use feed::{HighwayConfig, HighwayFeed, KinematicFeed};
pub use simulation::Simulation;
pub use stream::EventStream;
pub use traffic::{TrafficConfig, TrafficGenerator};
