//! Simulation configuration.
//!
//! Defaults come from the component configs. A JSON file named by
//! `VANET_CONFIG` replaces them, and individual `VANET_*` variables override
//! single fields on top.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use vanet_cluster::ClusterConfig;
use vanet_consensus::{PoaConfig, RecoveryPolicy};
use vanet_routing::RouterConfig;
use vanet_topology::DEFAULT_MAX_SPEED;

use crate::error::{Error, Result};
use crate::feed::HighwayConfig;
use crate::traffic::TrafficConfig;

/// Everything a [`crate::Simulation`] and the demo driver are tuned by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed for the highway feed and the traffic generator
    pub seed: u64,
    /// Wall-clock length of one tick for the interval driver
    pub tick_ms: u64,
    /// Kinematic updates faster than this are rejected
    pub max_speed: f64,
    /// Buffered events per subscriber before it lags
    pub event_capacity: usize,
    pub cluster: ClusterConfig,
    pub poa: PoaConfig,
    pub recovery: RecoveryPolicy,
    pub router: RouterConfig,
    pub highway: HighwayConfig,
    pub traffic: TrafficConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            tick_ms: 100,
            max_speed: DEFAULT_MAX_SPEED,
            event_capacity: 1024,
            cluster: ClusterConfig::default(),
            poa: PoaConfig::default(),
            recovery: RecoveryPolicy::default(),
            router: RouterConfig::default(),
            highway: HighwayConfig::default(),
            traffic: TrafficConfig::default(),
        }
    }
}

impl SimConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var("VANET_CONFIG") {
            Ok(path) => Self::from_json_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `VANET_*` overrides from any variable source.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(seed) = parse_var(&lookup, "VANET_SEED")? {
            self.seed = seed;
        }
        if let Some(tick_ms) = parse_var(&lookup, "VANET_TICK_MS")? {
            self.tick_ms = tick_ms;
        }
        if let Some(range) = parse_var(&lookup, "VANET_DSRC_RANGE")? {
            self.cluster.dsrc_range = range;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_ms == 0 {
            return Err(Error::Parameter {
                name: "tick_ms",
                reason: "must be positive",
            });
        }
        if !(self.max_speed.is_finite() && self.max_speed > 0.0) {
            return Err(Error::Parameter {
                name: "max_speed",
                reason: "must be finite and positive",
            });
        }
        if self.event_capacity == 0 {
            return Err(Error::Parameter {
                name: "event_capacity",
                reason: "must be positive",
            });
        }
        self.cluster.validate()?;
        self.poa.validate()?;
        self.router.validate()?;
        self.highway.validate()?;
        self.traffic.validate()?;
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&'static str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::InvalidEnv { var, value }),
    }
}
