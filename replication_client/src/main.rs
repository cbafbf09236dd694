//! Standalone observer binary.
//!
//! Usage:
//!   cargo run -p replication_client -- [--config observer.json] [--addr 127.0.0.1:40000]
//!       [--tick-hz 50] [--cubes 64] [--seed 1] [--min -20] [--max 20]
//!       [--strategy snap|first_order|phbe] [--ticks N]
//!
//! Scene flags must match the host's so both sides build the same actors.

use std::env;

use anyhow::Context;
use replication_client::ObserverNode;
use replication_shared::config::{EngineConfig, StrategyKind};
use tracing::info;

struct Args {
    cfg: EngineConfig,
    ticks: Option<u64>,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = env::args().collect();

    let cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            let path = &args[i + 1];
            let text = std::fs::read_to_string(path).with_context(|| format!("read {path}"))?;
            EngineConfig::from_json_str(&text).with_context(|| format!("parse {path}"))?
        }
        _ => EngineConfig::default(),
    };
    let mut out = Args { cfg, ticks: None };

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1).map(String::as_str);
        let cfg = &mut out.cfg;
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
            ("--ticks", Some(v)) => out.ticks = Some(v.parse().context("--ticks")?),
            ("--config", Some(_)) => {}
            _ => {
                i += 1;
                continue;
            }
        }
        i += 2;
    }
    Ok(out)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let Args { cfg, ticks } = parse_args()?;
    info!(
        server = %cfg.server_addr,
        tick_hz = cfg.tick_hz,
        strategy = ?cfg.replication.strategy,
        "Starting observer"
    );

    let mut observer = ObserverNode::connect(cfg.clone())
        .await
        .context("connect observer")?;
    info!(local = %observer.local_addr()?, "Observer bound");

    let tick_interval = std::time::Duration::from_secs_f64(cfg.tick_secs());
    let mut next_tick = tokio::time::Instant::now();
    let mut tick = 0u64;

    while ticks.map_or(true, |limit| tick < limit) {
        observer.step(tick_interval.as_secs_f64())?;
        tick += 1;

        if tick % u64::from(cfg.tick_hz.max(1)) == 0 {
            let stats = observer.stats();
            info!(
                tick,
                tracked = observer.session().registry().len(),
                applied = stats.applied,
                skipped = stats.skipped,
                warnings = stats.warnings,
                "Observer status"
            );
        }

        next_tick += tick_interval;
        tokio::time::sleep_until(next_tick).await;
    }
    Ok(())
}
