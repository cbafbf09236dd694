//! Replication session: the role state machine.
//!
//! ```text
//! Idle ──become_authoritative──▶ Authoritative ──channel closed / close()──▶ Closed
//!   └───become_observer────────▶ Observer ──────channel closed / close()──▶ Closed
//! ```
//!
//! The role is fixed once chosen. One `tick` runs to completion without
//! blocking: the channel is polled until empty, never waited on.
//!
//! Authoritative tick: drain control packets, rebuild the registry, advance
//! the scheduler, force stale actors, serialize up to `sync_budget` actors.
//!
//! Observer tick: decode every waiting packet, push snapshots into per-actor
//! history, reconstruct and apply, then ask the host to resync actors that
//! went quiet for longer than `time_maximum_unsynced`.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::{
    config::ReplicationConfig,
    error::ReplicationError,
    history::History,
    ids::{ActorHandle, ActorId},
    net::{Channel, Packet, MAX_IDS_PER_PACKET},
    reconstruct::reconstruct,
    registry::{PriorityTier, Registry},
    scheduler::SyncScheduler,
    state::Snapshot,
    world::{ActorAccessor, PointsOfInterest},
};

/// Session role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Authoritative,
    Observer,
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Snapshots written (authoritative).
    pub sent: usize,
    /// Snapshots applied to local actors (observer).
    pub applied: usize,
    /// Messages or queue entries skipped: lookup-misses, duplicates, garbage.
    pub skipped: usize,
    /// Recoverable conditions raised this tick.
    pub warnings: Vec<ReplicationError>,
}

/// Result of a tick. `Closed` is the only terminal signal.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Continue(TickReport),
    Closed,
}

/// Observer-side estimate of host time.
///
/// The offset is the largest `host_timestamp - local_receive_time` seen, i.e.
/// the sample that spent the least time in flight.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteClock {
    offset: Option<f64>,
}

impl RemoteClock {
    pub fn observe(&mut self, host_timestamp: f64, local_now: f64) {
        let sample = host_timestamp - local_now;
        self.offset = Some(self.offset.map_or(sample, |o| o.max(sample)));
    }

    pub fn estimate(&self, local_now: f64) -> f64 {
        local_now + self.offset.unwrap_or(0.0)
    }
}

struct AuthorityState {
    scheduler: SyncScheduler,
    share_pending: bool,
}

struct ObserverState {
    histories: HashMap<ActorId, History>,
    last_received: HashMap<ActorId, f64>,
    resync_requested: HashMap<ActorId, f64>,
    clock: RemoteClock,
}

enum RoleState {
    Idle,
    Authoritative(AuthorityState),
    Observer(ObserverState),
    Closed,
}

/// Ties registry, scheduler, codec and reconstruction to one channel.
pub struct ReplicationSession<C> {
    cfg: ReplicationConfig,
    channel: Option<C>,
    registry: Registry,
    state: RoleState,
}

impl<C: Channel> ReplicationSession<C> {
    pub fn new(cfg: ReplicationConfig, channel: C) -> Self {
        let registry = Registry::from_config(&cfg);
        Self {
            cfg,
            channel: Some(channel),
            registry,
            state: RoleState::Idle,
        }
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.cfg
    }

    pub fn role(&self) -> Option<Role> {
        match self.state {
            RoleState::Authoritative(_) => Some(Role::Authoritative),
            RoleState::Observer(_) => Some(Role::Observer),
            RoleState::Idle | RoleState::Closed => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, RoleState::Closed)
    }

    fn leave_idle(&mut self) -> Result<(), ReplicationError> {
        match self.state {
            RoleState::Idle => Ok(()),
            RoleState::Closed => Err(ReplicationError::ChannelClosed),
            _ => Err(ReplicationError::RoleLocked),
        }
    }

    pub fn become_authoritative(&mut self) -> Result<(), ReplicationError> {
        self.leave_idle()?;
        self.state = RoleState::Authoritative(AuthorityState {
            scheduler: SyncScheduler::new(&self.cfg),
            share_pending: true,
        });
        info!(actors = self.registry.len(), "Session is authoritative");
        Ok(())
    }

    pub fn become_observer(&mut self) -> Result<(), ReplicationError> {
        self.leave_idle()?;
        self.state = RoleState::Observer(ObserverState {
            histories: HashMap::new(),
            last_received: HashMap::new(),
            resync_requested: HashMap::new(),
            clock: RemoteClock::default(),
        });
        info!(actors = self.registry.len(), "Session is observing");
        Ok(())
    }

    /// The transport, until the session closes.
    pub fn channel(&self) -> Option<&C> {
        self.channel.as_ref()
    }

    /// Observer only: tells the host transport this peer exists.
    pub fn announce(&mut self) -> Result<(), ReplicationError> {
        match self.state {
            RoleState::Observer(_) => self.send(Packet::Hello.encode()),
            RoleState::Closed => Err(ReplicationError::ChannelClosed),
            _ => Err(ReplicationError::RoleLocked),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn scheduler(&self) -> Option<&SyncScheduler> {
        match &self.state {
            RoleState::Authoritative(a) => Some(&a.scheduler),
            _ => None,
        }
    }

    pub fn history(&self, id: ActorId) -> Option<&History> {
        match &self.state {
            RoleState::Observer(o) => o.histories.get(&id),
            _ => None,
        }
    }

    /// Starts tracking an actor. No-op once closed, or when the registry
    /// already holds as many actors as one `ShareRegistry` can list.
    pub fn register(&mut self, id: ActorId, default_tier: PriorityTier) -> Option<ActorHandle> {
        if self.is_closed() {
            return None;
        }
        let known = self.registry.contains(id);
        if !known && self.registry.len() >= MAX_IDS_PER_PACKET {
            warn!(actor = %id, max = MAX_IDS_PER_PACKET, "Registry full, actor not tracked");
            return None;
        }
        let handle = self.registry.register(id, default_tier);
        if !known {
            if let RoleState::Authoritative(a) = &mut self.state {
                a.share_pending = true;
            }
        }
        Some(handle)
    }

    /// Registers every id at the configured default tier.
    pub fn register_all(&mut self, ids: impl IntoIterator<Item = ActorId>) {
        let tier = self.cfg.default_tier;
        for id in ids {
            self.register(id, tier);
        }
    }

    /// Stops tracking an actor and purges its history and queue entries.
    pub fn deregister(&mut self, id: ActorId) -> bool {
        let handle = self.registry.handle_of(id);
        if !self.registry.deregister(id) {
            return false;
        }
        match &mut self.state {
            RoleState::Authoritative(a) => {
                a.scheduler.forget(id, handle);
                a.share_pending = true;
            }
            RoleState::Observer(o) => {
                o.histories.remove(&id);
                o.last_received.remove(&id);
                o.resync_requested.remove(&id);
            }
            RoleState::Idle | RoleState::Closed => {}
        }
        true
    }

    /// Queues a `ShareRegistry` for the end of the next authoritative tick.
    pub fn share_registry(&mut self) {
        if let RoleState::Authoritative(a) = &mut self.state {
            a.share_pending = true;
        }
    }

    /// Tears the session down and releases registry, queue and histories.
    pub fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.registry.clear();
        self.channel = None;
        self.state = RoleState::Closed;
        info!("Session closed");
    }

    /// Runs one fixed step. `now` is this side's clock in seconds, `dt` the
    /// step length.
    pub fn tick<W>(&mut self, now: f64, dt: f64, world: &mut W) -> TickOutcome
    where
        W: ActorAccessor + PointsOfInterest,
    {
        let result = match self.state {
            RoleState::Closed => return TickOutcome::Closed,
            RoleState::Idle => return TickOutcome::Continue(TickReport::default()),
            RoleState::Authoritative(_) => self.tick_authoritative(now, dt, world),
            RoleState::Observer(_) => self.tick_observer(now, world),
        };
        match result {
            Ok(report) => TickOutcome::Continue(report),
            Err(_) => {
                self.close();
                TickOutcome::Closed
            }
        }
    }

    fn send(&mut self, bytes: Bytes) -> Result<(), ReplicationError> {
        match self.channel.as_mut() {
            Some(ch) => ch.send(bytes),
            None => Err(ReplicationError::ChannelClosed),
        }
    }

    fn receive(&mut self) -> Result<Option<Bytes>, ReplicationError> {
        match self.channel.as_mut() {
            Some(ch) => ch.try_receive(),
            None => Err(ReplicationError::ChannelClosed),
        }
    }

    fn tick_authoritative<W>(
        &mut self,
        now: f64,
        dt: f64,
        world: &mut W,
    ) -> Result<TickReport, ReplicationError>
    where
        W: ActorAccessor + PointsOfInterest,
    {
        let mut report = TickReport::default();

        while let Some(bytes) = self.receive()? {
            let packet = match Packet::decode(&bytes) {
                Ok(packet) => packet,
                Err(e) => {
                    debug!(error = %e, "Dropping malformed packet");
                    report.skipped += 1;
                    report.warnings.push(e);
                    continue;
                }
            };
            let RoleState::Authoritative(auth) = &mut self.state else {
                break;
            };
            match packet {
                Packet::Hello => auth.share_pending = true,
                Packet::ResyncRequest { actor_ids } => {
                    for id in actor_ids {
                        match self.registry.handle_of(id) {
                            Some(handle) => auth.scheduler.force(handle),
                            None => report.warnings.push(ReplicationError::UnknownActor(id)),
                        }
                    }
                }
                other => debug!(?other, "Ignoring packet on authoritative side"),
            }
        }

        let points = world.points_of_interest();
        self.registry.rebuild(&*world, &points);

        let RoleState::Authoritative(auth) = &mut self.state else {
            return Ok(report);
        };
        auth.scheduler.advance(dt, &self.registry);
        report
            .warnings
            .extend(auth.scheduler.collect_stale(now, &self.registry));
        let due = auth.scheduler.drain(self.cfg.sync_budget);
        let share = std::mem::take(&mut auth.share_pending);

        for handle in due {
            // Deregistered after being queued: lookup-miss, not a fault.
            let Some(id) = self.registry.resolve(handle) else {
                report.skipped += 1;
                continue;
            };
            let Some(state) = world.get_state(id) else {
                debug!(actor = %id, "No state to sync");
                report.skipped += 1;
                continue;
            };
            let packet = Packet::Snapshot {
                actor: id,
                snapshot: Snapshot::new(now, state),
            };
            self.send(packet.encode())?;
            if let RoleState::Authoritative(auth) = &mut self.state {
                auth.scheduler.mark_synced(id, now);
            }
            report.sent += 1;
        }

        if share {
            let actor_ids = self.registry.actor_ids();
            debug!(actors = actor_ids.len(), "Sharing registry");
            self.send(Packet::ShareRegistry { actor_ids }.encode())?;
        }

        Ok(report)
    }

    fn tick_observer<W>(&mut self, now: f64, world: &mut W) -> Result<TickReport, ReplicationError>
    where
        W: ActorAccessor,
    {
        let mut report = TickReport::default();

        while let Some(bytes) = self.receive()? {
            match Packet::decode(&bytes) {
                Ok(Packet::Snapshot { actor, snapshot }) => {
                    self.apply_snapshot(actor, snapshot, now, world, &mut report)
                }
                Ok(Packet::ShareRegistry { actor_ids }) => self.reconcile_registry(&actor_ids),
                Ok(other) => debug!(?other, "Ignoring packet on observer side"),
                Err(e) => {
                    debug!(error = %e, "Dropping malformed packet");
                    report.skipped += 1;
                    report.warnings.push(e);
                }
            }
        }

        let stale = self.collect_quiet_actors(now, &mut report);
        if !stale.is_empty() {
            self.send(Packet::ResyncRequest { actor_ids: stale }.encode())?;
        }
        Ok(report)
    }

    fn apply_snapshot<W: ActorAccessor>(
        &mut self,
        actor: ActorId,
        snapshot: Snapshot,
        now: f64,
        world: &mut W,
        report: &mut TickReport,
    ) {
        if !self.registry.contains(actor) {
            debug!(%actor, "Snapshot for unknown actor dropped");
            report.warnings.push(ReplicationError::UnknownActor(actor));
            return;
        }
        let RoleState::Observer(obs) = &mut self.state else {
            return;
        };
        let depth = self.cfg.history_depth;
        let history = obs
            .histories
            .entry(actor)
            .or_insert_with(|| History::new(depth));
        if !history.push(snapshot) {
            report.skipped += 1;
            return;
        }
        obs.clock.observe(snapshot.timestamp, now);
        obs.last_received.insert(actor, now);
        obs.resync_requested.remove(&actor);

        let Some(previous) = world.get_state(actor) else {
            report.skipped += 1;
            return;
        };
        let host_now = obs.clock.estimate(now);
        let Some(state) = reconstruct(
            self.cfg.strategy,
            &previous,
            history,
            host_now,
            self.cfg.blend_alpha,
        ) else {
            return;
        };
        if world.set_state(actor, state) {
            report.applied += 1;
        } else {
            report.skipped += 1;
        }
    }

    /// Drops local actors the host no longer tracks.
    fn reconcile_registry(&mut self, host_ids: &[ActorId]) {
        let host: HashSet<ActorId> = host_ids.iter().copied().collect();
        let gone: Vec<ActorId> = self
            .registry
            .actor_ids()
            .into_iter()
            .filter(|id| !host.contains(id))
            .collect();
        for id in &gone {
            self.deregister(*id);
        }
        let missing = host_ids
            .iter()
            .filter(|id| !self.registry.contains(**id))
            .count();
        debug!(
            host = host_ids.len(),
            dropped = gone.len(),
            missing,
            "Registry reconciled with host"
        );
    }

    fn collect_quiet_actors(&mut self, now: f64, report: &mut TickReport) -> Vec<ActorId> {
        let max = self.cfg.time_maximum_unsynced;
        let ids = self.registry.actor_ids();
        let RoleState::Observer(obs) = &mut self.state else {
            return Vec::new();
        };
        let mut stale = Vec::new();
        for id in ids {
            let last = *obs.last_received.entry(id).or_insert(now);
            let since_request = obs.resync_requested.get(&id).map_or(f64::INFINITY, |t| now - *t);
            let unsynced_for = now - last;
            if unsynced_for >= max && since_request >= max {
                warn!(actor = %id, unsynced_for, "No snapshot received, requesting resync");
                report.warnings.push(ReplicationError::StaleActor {
                    actor: id,
                    unsynced_for,
                });
                obs.resync_requested.insert(id, now);
                stale.push(id);
            }
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::StrategyKind,
        error::Malformed,
        math::Vec3,
        net::LoopbackChannel,
        state::KinematicState,
        world::{ActorTags, World},
    };

    fn cfg() -> ReplicationConfig {
        ReplicationConfig {
            no_sync_radius: 5.0,
            priority_radius: 10.0,
            ..Default::default()
        }
    }

    fn drain(ch: &mut LoopbackChannel) -> Vec<Packet> {
        let mut out = Vec::new();
        while let Some(bytes) = ch.try_receive().unwrap() {
            out.push(Packet::decode(&bytes).unwrap());
        }
        out
    }

    fn report(outcome: TickOutcome) -> TickReport {
        match outcome {
            TickOutcome::Continue(r) => r,
            TickOutcome::Closed => panic!("session closed"),
        }
    }

    fn snapshot_ids(packets: &[Packet]) -> Vec<ActorId> {
        packets
            .iter()
            .filter_map(|p| match p {
                Packet::Snapshot { actor, .. } => Some(*actor),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn role_is_fixed_once_chosen() {
        let (a, _b) = LoopbackChannel::pair();
        let mut s = ReplicationSession::new(cfg(), a);
        assert_eq!(s.role(), None);
        s.become_observer().unwrap();
        assert_eq!(s.become_authoritative(), Err(ReplicationError::RoleLocked));
        assert_eq!(s.become_observer(), Err(ReplicationError::RoleLocked));
        assert_eq!(s.role(), Some(Role::Observer));
    }

    #[test]
    fn authoritative_tick_sends_snapshots_and_registry() {
        let (a, mut b) = LoopbackChannel::pair();
        let mut world = World::default();
        world.insert_tracked(ActorId(1), KinematicState::at(Vec3::new(1.0, 0.0, 0.0)));
        world.insert_tracked(ActorId(2), KinematicState::at(Vec3::new(2.0, 0.0, 0.0)));

        let mut s = ReplicationSession::new(cfg(), a);
        s.register_all(world.with_tags(ActorTags::TRACKED));
        s.become_authoritative().unwrap();

        let r = report(s.tick(0.5, 0.02, &mut world));
        assert_eq!(r.sent, 2);
        let packets = drain(&mut b);
        assert_eq!(snapshot_ids(&packets), vec![ActorId(1), ActorId(2)]);
        assert!(packets.contains(&Packet::ShareRegistry {
            actor_ids: vec![ActorId(1), ActorId(2)]
        }));
        match &packets[0] {
            Packet::Snapshot { snapshot, .. } => assert_eq!(snapshot.timestamp, 0.5),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn excluded_actor_is_skipped_until_observer_moves_away() {
        let (a, mut b) = LoopbackChannel::pair();
        let mut world = World::default();
        world.insert_tracked(ActorId(1), KinematicState::at(Vec3::ZERO));
        world.insert(
            ActorId(100),
            KinematicState::at(Vec3::new(4.0, 0.0, 0.0)),
            ActorTags::PLAYER,
        );

        let mut s = ReplicationSession::new(cfg(), a);
        s.register(ActorId(1), PriorityTier::MIN);
        s.become_authoritative().unwrap();

        report(s.tick(0.0, 0.1, &mut world));
        assert!(s.registry().is_excluded(ActorId(1)));
        assert!(snapshot_ids(&drain(&mut b)).is_empty());

        world.get_mut(ActorId(100)).unwrap().state.position = Vec3::new(6.0, 0.0, 0.0);
        report(s.tick(0.1, 0.1, &mut world));
        assert_eq!(s.registry().tier_of(ActorId(1)), Some(PriorityTier::MAX));
        assert_eq!(snapshot_ids(&drain(&mut b)), vec![ActorId(1)]);
    }

    #[test]
    fn stale_excluded_actor_is_force_resynced() {
        let (a, mut b) = LoopbackChannel::pair();
        let mut world = World::default();
        world.insert_tracked(ActorId(1), KinematicState::at(Vec3::ZERO));
        world.insert(ActorId(100), KinematicState::at(Vec3::ZERO), ActorTags::PLAYER);

        let mut s = ReplicationSession::new(cfg(), a);
        s.register(ActorId(1), PriorityTier::MIN);
        s.become_authoritative().unwrap();

        assert!(report(s.tick(0.0, 0.0, &mut world)).warnings.is_empty());
        drain(&mut b);
        let r = report(s.tick(6.0, 0.1, &mut world));
        assert_eq!(
            r.warnings,
            vec![ReplicationError::StaleActor {
                actor: ActorId(1),
                unsynced_for: 6.0
            }]
        );
        assert_eq!(r.sent, 1);
        assert_eq!(snapshot_ids(&drain(&mut b)), vec![ActorId(1)]);
    }

    #[test]
    fn observer_applies_snaps_and_drops_unknown_and_garbage() {
        let (mut host, obs_end) = LoopbackChannel::pair();
        let mut world = World::default();
        world.insert_tracked(ActorId(1), KinematicState::default());

        let mut s = ReplicationSession::new(
            ReplicationConfig {
                strategy: StrategyKind::Snap,
                ..cfg()
            },
            obs_end,
        );
        s.register(ActorId(1), PriorityTier::MIN);
        s.become_observer().unwrap();

        let target = KinematicState::at(Vec3::new(3.0, 2.0, 1.0));
        for (actor, t) in [(1, 1.0), (1, 1.0), (7, 1.0)] {
            host.send(
                Packet::Snapshot {
                    actor: ActorId(actor),
                    snapshot: Snapshot::new(t, target),
                }
                .encode(),
            )
            .unwrap();
        }
        host.send(Bytes::from_static(&[0x01, 0x00])).unwrap();

        let r = report(s.tick(1.0, 0.02, &mut world));
        assert_eq!(r.applied, 1);
        assert_eq!(r.skipped, 2);
        assert!(r.warnings.contains(&ReplicationError::UnknownActor(ActorId(7))));
        assert_eq!(world.get_state(ActorId(1)), Some(target));
        assert_eq!(s.history(ActorId(1)).unwrap().len(), 1);
    }

    #[test]
    fn corrupt_timestamp_never_reaches_history_or_world() {
        let (mut host, obs_end) = LoopbackChannel::pair();
        let mut world = World::default();
        world.insert_tracked(ActorId(1), KinematicState::default());

        let mut s = ReplicationSession::new(
            ReplicationConfig {
                strategy: StrategyKind::Phbe,
                ..cfg()
            },
            obs_end,
        );
        s.register(ActorId(1), PriorityTier::MIN);
        s.become_observer().unwrap();

        for t in [1.0, 2.0, f64::NAN, 0.5, 3.0] {
            let state = KinematicState::at(Vec3::new(t as f32, 0.0, 0.0));
            host.send(
                Packet::Snapshot {
                    actor: ActorId(1),
                    snapshot: Snapshot::new(t, state),
                }
                .encode(),
            )
            .unwrap();
        }

        let r = report(s.tick(3.0, 0.02, &mut world));
        assert_eq!(r.applied, 3);
        assert_eq!(r.skipped, 2);
        assert!(r.warnings.contains(&ReplicationError::MalformedSnapshot(
            Malformed::NonFiniteTimestamp
        )));
        let ts: Vec<f64> = s
            .history(ActorId(1))
            .unwrap()
            .iter()
            .map(|snap| snap.timestamp)
            .collect();
        assert_eq!(ts, vec![3.0, 2.0, 1.0]);
        let position = world.get_state(ActorId(1)).unwrap().position;
        assert!(position.x.is_finite() && position.y.is_finite() && position.z.is_finite());
    }

    #[test]
    fn observer_requests_resync_for_quiet_actor() {
        let (mut host, obs_end) = LoopbackChannel::pair();
        let mut world = World::default();
        world.insert_tracked(ActorId(3), KinematicState::default());

        let mut s = ReplicationSession::new(cfg(), obs_end);
        s.register(ActorId(3), PriorityTier::MIN);
        s.become_observer().unwrap();

        report(s.tick(0.0, 0.02, &mut world));
        let r = report(s.tick(6.0, 0.02, &mut world));
        assert_eq!(
            r.warnings,
            vec![ReplicationError::StaleActor {
                actor: ActorId(3),
                unsynced_for: 6.0
            }]
        );
        assert_eq!(
            drain(&mut host),
            vec![Packet::ResyncRequest {
                actor_ids: vec![ActorId(3)]
            }]
        );
        // Not repeated until another full period passes.
        assert!(report(s.tick(7.0, 0.02, &mut world)).warnings.is_empty());
    }

    #[test]
    fn share_registry_drops_actors_the_host_forgot() {
        let (mut host, obs_end) = LoopbackChannel::pair();
        let mut world = World::default();
        let mut s = ReplicationSession::new(cfg(), obs_end);
        s.register_all([ActorId(1), ActorId(2), ActorId(3)]);
        s.become_observer().unwrap();

        host.send(
            Packet::ShareRegistry {
                actor_ids: vec![ActorId(1), ActorId(3), ActorId(9)],
            }
            .encode(),
        )
        .unwrap();
        report(s.tick(0.0, 0.02, &mut world));
        assert_eq!(s.registry().actor_ids(), vec![ActorId(1), ActorId(3)]);
    }

    #[test]
    fn deregistered_actor_in_queue_is_never_serialized() {
        let (a, mut b) = LoopbackChannel::pair();
        let mut world = World::default();
        for i in 1..=3 {
            world.insert_tracked(ActorId(i), KinematicState::default());
        }
        let mut s = ReplicationSession::new(
            ReplicationConfig {
                sync_budget: Some(1),
                ..cfg()
            },
            a,
        );
        s.register_all([ActorId(1), ActorId(2), ActorId(3)]);
        s.become_authoritative().unwrap();

        assert_eq!(report(s.tick(0.0, 0.0, &mut world)).sent, 1);
        assert_eq!(s.scheduler().unwrap().queue_len(), 2);
        s.deregister(ActorId(2));
        world.remove(ActorId(2));

        let r = report(s.tick(0.01, 0.01, &mut world));
        assert_eq!(r.sent, 1);
        assert_eq!(snapshot_ids(&drain(&mut b)), vec![ActorId(1), ActorId(3)]);
    }

    #[test]
    fn registry_is_capped_at_one_share_packet() {
        let (a, mut b) = LoopbackChannel::pair();
        let mut world = World::default();
        let mut s = ReplicationSession::new(cfg(), a);
        s.register_all((0..MAX_IDS_PER_PACKET as u32).map(ActorId));
        assert_eq!(s.registry().len(), MAX_IDS_PER_PACKET);
        assert_eq!(s.register(ActorId(MAX_IDS_PER_PACKET as u32), PriorityTier::MIN), None);
        assert!(s.register(ActorId(0), PriorityTier::MIN).is_some());
        assert_eq!(s.registry().len(), MAX_IDS_PER_PACKET);
        s.become_authoritative().unwrap();

        report(s.tick(0.0, 0.02, &mut world));
        let shared: Vec<usize> = drain(&mut b)
            .into_iter()
            .filter_map(|p| match p {
                Packet::ShareRegistry { actor_ids } => Some(actor_ids.len()),
                _ => None,
            })
            .collect();
        assert_eq!(shared, vec![MAX_IDS_PER_PACKET]);
    }

    #[test]
    fn actor_without_state_is_not_rewarned_every_tick() {
        let (a, _b) = LoopbackChannel::pair();
        let mut world = World::default();
        let mut s = ReplicationSession::new(cfg(), a);
        s.register(ActorId(1), PriorityTier::MIN);
        s.become_authoritative().unwrap();

        let r = report(s.tick(0.0, 0.0, &mut world));
        assert_eq!((r.sent, r.skipped), (0, 1));
        assert_eq!(report(s.tick(6.0, 0.1, &mut world)).warnings.len(), 1);
        for i in 1..=10 {
            let now = 6.0 + 0.1 * i as f64;
            assert!(report(s.tick(now, 0.1, &mut world)).warnings.is_empty());
        }
        assert_eq!(report(s.tick(12.0, 0.1, &mut world)).warnings.len(), 1);
    }

    #[test]
    fn channel_closure_tears_session_down() {
        let (a, b) = LoopbackChannel::pair();
        let mut world = World::default();
        world.insert_tracked(ActorId(1), KinematicState::default());
        let mut s = ReplicationSession::new(cfg(), a);
        s.register(ActorId(1), PriorityTier::MIN);
        s.become_observer().unwrap();

        drop(b);
        assert_eq!(s.tick(0.0, 0.02, &mut world), TickOutcome::Closed);
        assert!(s.is_closed());
        assert!(s.registry().is_empty());
        assert!(s.history(ActorId(1)).is_none());
        assert_eq!(s.tick(0.1, 0.02, &mut world), TickOutcome::Closed);
        assert_eq!(s.register(ActorId(1), PriorityTier::MIN), None);
    }

    #[test]
    fn hello_triggers_registry_share() {
        let (host_end, obs_end) = LoopbackChannel::pair();
        let mut host_world = World::default();
        host_world.insert_tracked(ActorId(4), KinematicState::default());
        let mut obs_world = World::default();

        let mut host = ReplicationSession::new(cfg(), host_end);
        host.register(ActorId(4), PriorityTier::MIN);
        host.become_authoritative().unwrap();
        let mut obs = ReplicationSession::new(cfg(), obs_end);
        assert_eq!(obs.announce(), Err(ReplicationError::RoleLocked));
        obs.register_all([ActorId(4), ActorId(5)]);
        obs.become_observer().unwrap();

        report(host.tick(0.0, 0.02, &mut host_world));
        report(obs.tick(0.0, 0.02, &mut obs_world));
        assert_eq!(obs.registry().actor_ids(), vec![ActorId(4)]);

        obs.register(ActorId(5), PriorityTier::MIN);
        obs.announce().unwrap();
        report(host.tick(0.02, 0.02, &mut host_world));
        report(obs.tick(0.02, 0.02, &mut obs_world));
        assert_eq!(obs.registry().actor_ids(), vec![ActorId(4)]);
    }

    #[test]
    fn remote_clock_tracks_least_delayed_sample() {
        let mut clock = RemoteClock::default();
        assert_eq!(clock.estimate(2.0), 2.0);
        clock.observe(10.0, 1.0);
        clock.observe(10.5, 2.0);
        assert_eq!(clock.estimate(3.0), 12.0);
    }
}
