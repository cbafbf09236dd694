//! Observer loop.
//!
//! The observer builds the same seeded scene as the host so actor ids agree,
//! then lets the replication session overwrite local kinematic state from
//! received snapshots. It never runs physics on replicated actors.
//!
//! Until the first snapshot lands the observer keeps saying hello, since the
//! host only learns about peers from that packet and UDP may lose it. After
//! that it repeats the hello at a slower keepalive rate so the host does not
//! time it out.

use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use replication_shared::{
    config::EngineConfig,
    error::ReplicationError,
    net::Channel,
    scene,
    session::{ReplicationSession, TickOutcome, TickReport},
    world::{ActorTags, World},
};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::transport::UdpObserverChannel;

/// Seconds between hellos while unsynced.
pub const HELLO_INTERVAL: f64 = 0.5;
/// Seconds between hellos once snapshots arrive.
pub const KEEPALIVE_INTERVAL: f64 = 2.0;

/// Running totals since the observer started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObserverStats {
    pub applied: usize,
    pub skipped: usize,
    pub warnings: usize,
}

pub struct ObserverNode<C> {
    pub cfg: EngineConfig,
    world: World,
    session: ReplicationSession<C>,
    clock: f64,
    since_hello: f64,
    stats: ObserverStats,
}

impl<C: Channel> ObserverNode<C> {
    pub fn new(cfg: EngineConfig, channel: C) -> anyhow::Result<Self> {
        cfg.replication.validate().context("replication config")?;
        let world = scene::build(&cfg.scene);
        let mut session = ReplicationSession::new(cfg.replication.clone(), channel);
        session.register_all(world.with_tags(ActorTags::TRACKED));
        session.become_observer()?;
        session.announce()?;
        info!(
            actors = session.registry().len(),
            strategy = ?cfg.replication.strategy,
            "Observer ready"
        );
        Ok(Self {
            cfg,
            world,
            session,
            clock: 0.0,
            since_hello: 0.0,
            stats: ObserverStats::default(),
        })
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn session(&self) -> &ReplicationSession<C> {
        &self.session
    }

    pub fn stats(&self) -> ObserverStats {
        self.stats
    }

    /// Local time in seconds.
    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Executes one fixed step.
    pub fn step(&mut self, dt_sec: f64) -> anyhow::Result<TickReport> {
        self.clock += dt_sec;
        let report = match self.session.tick(self.clock, dt_sec, &mut self.world) {
            TickOutcome::Continue(report) => report,
            TickOutcome::Closed => return Err(ReplicationError::ChannelClosed.into()),
        };
        self.stats.applied += report.applied;
        self.stats.skipped += report.skipped;
        self.stats.warnings += report.warnings.len();

        let interval = if self.stats.applied == 0 {
            HELLO_INTERVAL
        } else {
            KEEPALIVE_INTERVAL
        };
        self.since_hello += dt_sec;
        if self.since_hello >= interval {
            self.since_hello = 0.0;
            debug!(synced = self.stats.applied > 0, "Saying hello");
            self.session.announce()?;
        }
        Ok(report)
    }

    /// Runs a number of steps paced at `tick_hz`.
    pub async fn run_for_ticks(&mut self, ticks: u32) -> anyhow::Result<()> {
        let dt = Duration::from_secs_f64(self.cfg.tick_secs());
        let mut next = Instant::now();

        for _ in 0..ticks {
            next += dt;
            self.step(dt.as_secs_f64())?;
            tokio::time::sleep_until(next).await;
        }
        Ok(())
    }
}

impl ObserverNode<UdpObserverChannel> {
    /// Connects to the host at `cfg.server_addr`.
    pub async fn connect(cfg: EngineConfig) -> anyhow::Result<Self> {
        let server: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        info!(%server, "Connecting to host");
        let channel = UdpObserverChannel::connect(server).await?;
        Self::new(cfg, channel)
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.session
            .channel()
            .context("session closed")?
            .local_addr()
    }
}
