//! Authoritative host loop.
//!
//! Each fixed step moves the player, steps physics, then runs one
//! authoritative replication tick stamped with the host clock.
//!
//! Determinism notes:
//! - Keep simulation in a fixed timestep.
//! - The host clock is the sum of fixed steps, never wall time.
//! - The world iterates actors in id order.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use anyhow::Context;
use replication_shared::{
    config::EngineConfig,
    error::ReplicationError,
    net::Channel,
    physics::{Ballistic, PhysicsBackend},
    scene,
    session::{ReplicationSession, TickOutcome, TickReport},
    world::{ActorTags, World},
};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::transport::UdpHostChannel;

/// Host: world, physics and the authoritative session.
pub struct HostNode<C> {
    pub cfg: EngineConfig,
    world: World,
    physics: Box<dyn PhysicsBackend>,
    session: ReplicationSession<C>,
    clock: f64,
    tick: u64,
}

impl<C: Channel> HostNode<C> {
    /// Builds the demo scene and registers every tracked actor.
    pub fn new(cfg: EngineConfig, channel: C) -> anyhow::Result<Self> {
        cfg.replication.validate().context("replication config")?;
        let world = scene::build(&cfg.scene);
        let mut session = ReplicationSession::new(cfg.replication.clone(), channel);
        session.register_all(world.with_tags(ActorTags::TRACKED));
        session.become_authoritative()?;
        info!(
            actors = session.registry().len(),
            strategy = ?cfg.replication.strategy,
            "Host ready"
        );
        Ok(Self {
            cfg,
            world,
            physics: Box::new(Ballistic::default()),
            session,
            clock: 0.0,
            tick: 0,
        })
    }

    pub fn with_physics(mut self, physics: Box<dyn PhysicsBackend>) -> Self {
        self.physics = physics;
        self
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn session(&self) -> &ReplicationSession<C> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ReplicationSession<C> {
        &mut self.session
    }

    /// Host time in seconds.
    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Executes one fixed step.
    pub fn step(&mut self, dt_sec: f64) -> anyhow::Result<TickReport> {
        self.clock += dt_sec;
        scene::move_player(&mut self.world, &self.cfg.scene, self.clock);
        self.physics.step(&mut self.world, dt_sec as f32);

        let report = match self.session.tick(self.clock, dt_sec, &mut self.world) {
            TickOutcome::Continue(report) => report,
            TickOutcome::Closed => return Err(ReplicationError::ChannelClosed.into()),
        };
        self.tick += 1;
        if !report.warnings.is_empty() || report.skipped > 0 {
            debug!(
                tick = self.tick,
                skipped = report.skipped,
                warnings = report.warnings.len(),
                "Tick had warnings"
            );
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

impl HostNode<UdpHostChannel> {
    /// Binds the host socket at `cfg.server_addr`.
    pub async fn bind(cfg: EngineConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let channel = UdpHostChannel::bind(addr).await?;
        Self::new(cfg, channel)
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.session
            .channel()
            .context("session closed")?
            .local_addr()
    }

    pub fn peers(&self) -> Vec<SocketAddr> {
        self.session
            .channel()
            .map(UdpHostChannel::peers)
            .unwrap_or_default()
    }
}

/// Helper for tests: bind to an ephemeral port.
pub async fn bind_ephemeral(
    mut cfg: EngineConfig,
) -> anyhow::Result<(HostNode<UdpHostChannel>, EngineConfig)> {
    cfg.server_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).to_string();
    let mut host = HostNode::bind(cfg).await?;
    host.cfg.server_addr = host.local_addr()?.to_string();
    let cfg = host.cfg.clone();
    Ok((host, cfg))
}
