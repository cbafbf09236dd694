//! Standalone host binary.
//!
//! Usage:
//!   cargo run -p replication_server -- [--config host.json] [--addr 127.0.0.1:40000]
//!       [--tick-hz 50] [--cubes 64] [--seed 1] [--min -20] [--max 20]
//!       [--strategy snap|first_order|phbe] [--budget 32]
//!
//! The host builds the seeded demo scene, steps it at a fixed rate and
//! replicates it to every observer that says hello. Flags override the
//! config file.

use std::env;

use anyhow::Context;
use replication_server::HostNode;
use replication_shared::config::{EngineConfig, StrategyKind};
use tracing::info;

fn parse_args() -> anyhow::Result<EngineConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            let path = &args[i + 1];
            let text = std::fs::read_to_string(path).with_context(|| format!("read {path}"))?;
            EngineConfig::from_json_str(&text).with_context(|| format!("parse {path}"))?
        }
        _ => EngineConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1).map(String::as_str);
        match (args[i].as_str(), value) {
            ("--addr", Some(v)) => cfg.server_addr = v.to_string(),
            ("--tick-hz", Some(v)) => cfg.tick_hz = v.parse().unwrap_or(50),
            ("--cubes", Some(v)) => cfg.scene.cubes = v.parse().context("--cubes")?,
            ("--seed", Some(v)) => cfg.scene.seed = v.parse().context("--seed")?,
            ("--min", Some(v)) => cfg.scene.min = v.parse().context("--min")?,
            ("--max", Some(v)) => cfg.scene.max = v.parse().context("--max")?,
            ("--strategy", Some(v)) => {
                cfg.replication.strategy = match v {
                    "snap" => StrategyKind::Snap,
                    "first_order" => StrategyKind::FirstOrder,
                    "phbe" => StrategyKind::Phbe,
                    other => anyhow::bail!("unknown strategy {other}"),
                }
            }
            ("--budget", Some(v)) => cfg.replication.sync_budget = Some(v.parse().context("--budget")?),
            ("--config", Some(_)) => {}
            _ => {
                i += 1;
                continue;
            }
        }
        i += 2;
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(
        addr = %cfg.server_addr,
        tick_hz = cfg.tick_hz,
        cubes = cfg.scene.cubes,
        seed = cfg.scene.seed,
        "Starting host"
    );

    let mut host = HostNode::bind(cfg.clone()).await.context("create host")?;
    let local = host.local_addr()?;
    info!(%local, "Host listening");

    let tick_interval = std::time::Duration::from_secs_f64(cfg.tick_secs());
    let mut next_tick = tokio::time::Instant::now();
    let mut sent = 0usize;

    loop {
        let report = host.step(tick_interval.as_secs_f64())?;
        sent += report.sent;

        if host.tick() % u64::from(cfg.tick_hz.max(1)) == 0 {
            info!(
                tick = host.tick(),
                clock = host.clock(),
                peers = host.peers().len(),
                snapshots = sent,
                "Host status"
            );
            sent = 0;
        }

        next_tick += tick_interval;
        tokio::time::sleep_until(next_tick).await;
    }
}
