//! Highway demo: drives a seeded fleet through the coordination pipeline and
//! prints every event as one JSON line on stdout.
//!
//! Usage: `vanet-sim [TICKS]` (default 300). Configuration comes from
//! `VANET_CONFIG` and the `VANET_*` overrides; logs go to stderr.

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vanet_sim::{HighwayFeed, KinematicFeed, SimConfig, Simulation, TrafficGenerator};

const DEFAULT_TICKS: u64 = 300;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vanet_sim=info,vanet_cluster=info,vanet_consensus=info".into()),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let ticks = match std::env::args().nth(1) {
        Some(arg) => arg.parse::<u64>().map_err(|e| format!("invalid tick count {arg:?}: {e}"))?,
        None => DEFAULT_TICKS,
    };

    let config = SimConfig::from_env()?;
    info!(seed = config.seed, tick_ms = config.tick_ms, ticks, "starting highway simulation");

    let mut sim = Simulation::new(config.clone())?;
    let mut feed = HighwayFeed::new(config.highway.clone(), config.seed);
    let mut traffic = TrafficGenerator::new(config.traffic.clone(), config.seed.wrapping_add(1), feed.adversary());
    if let Some(adversary) = feed.adversary() {
        info!(%adversary, "adversary on the road");
    }

    let mut events = sim.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => warn!(error = %e, "failed to encode event"),
                },
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut interval = tokio::time::interval(Duration::from_millis(config.tick_ms));
    for _ in 0..ticks {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }

        for outgoing in traffic.generate(sim.fleet()) {
            if let Err(e) = sim.submit(outgoing) {
                debug!(error = %e, "submission refused");
            }
        }
        for node in feed.departures(sim.tick()) {
            sim.remove_node(node);
        }
        let updates = feed.next_tick(sim.tick());
        let report = sim.step(&updates);
        if report.flagged > 0 || report.elections > 0 {
            info!(
                tick = report.tick,
                clusters = report.clusters,
                elections = report.elections,
                flagged = report.flagged,
                "tick"
            );
        }
    }

    let stats = sim.stats();
    info!(
        ticks = stats.ticks,
        clusters_formed = stats.clusters_formed,
        elections = stats.elections,
        successions = stats.successions,
        flagged = stats.flagged,
        delivered = stats.router.delivered,
        dropped = stats.router.dropped,
        delivery_ratio = ?stats.delivery_ratio(),
        "simulation finished"
    );

    // Closing the stream lets the printer drain and exit
    drop(sim);
    printer.await?;
    Ok(())
}
