//! Sync scheduler.
//!
//! Every tier has its own interval. When a tier comes due, its members are
//! appended to the sync queue (most urgent tiers first) and the tier's clock
//! resets. Each tick drains at most `budget` actors from the front; the rest
//! wait for the next tick, so nothing is dropped, only delayed.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, warn};

use crate::{
    config::ReplicationConfig,
    error::ReplicationError,
    ids::{ActorHandle, ActorId},
    registry::{PriorityTier, Registry},
};

pub struct SyncScheduler {
    intervals: [f64; PriorityTier::COUNT],
    elapsed: [f64; PriorityTier::COUNT],
    queue: VecDeque<ActorHandle>,
    queued: HashSet<ActorHandle>,
    forced: HashSet<ActorHandle>,
    last_synced: HashMap<ActorId, f64>,
    last_warned: HashMap<ActorId, f64>,
    max_unsynced: f64,
}

fn slot(tier: PriorityTier) -> usize {
    usize::from(tier.clamped().get() - 1)
}

impl SyncScheduler {
    /// Every tier starts due, so the first tick syncs everything classified.
    pub fn new(cfg: &ReplicationConfig) -> Self {
        let mut intervals = [0.0; PriorityTier::COUNT];
        for tier in PriorityTier::by_urgency() {
            intervals[slot(tier)] = cfg.interval_for(tier);
        }
        Self {
            intervals,
            elapsed: intervals,
            queue: VecDeque::new(),
            queued: HashSet::new(),
            forced: HashSet::new(),
            last_synced: HashMap::new(),
            last_warned: HashMap::new(),
            max_unsynced: cfg.time_maximum_unsynced,
        }
    }

    pub fn interval(&self, tier: PriorityTier) -> f64 {
        self.intervals[slot(tier)]
    }

    pub fn elapsed(&self, tier: PriorityTier) -> f64 {
        self.elapsed[slot(tier)]
    }

    /// Advances every tier clock by `dt` and enqueues the members of each due
    /// tier. Returns how many actors were newly queued.
    pub fn advance(&mut self, dt: f64, registry: &Registry) -> usize {
        let mut added = 0;
        for tier in PriorityTier::by_urgency() {
            let i = slot(tier);
            self.elapsed[i] += dt;
            if self.elapsed[i] < self.intervals[i] {
                continue;
            }
            self.elapsed[i] = 0.0;
            for &handle in registry.members(tier) {
                if self.enqueue(handle) {
                    added += 1;
                }
            }
        }
        added
    }

    /// Appends `handle` unless it is already waiting.
    pub fn enqueue(&mut self, handle: ActorHandle) -> bool {
        if !self.queued.insert(handle) {
            return false;
        }
        self.queue.push_back(handle);
        true
    }

    /// Moves `handle` to the front of the queue regardless of tier schedule.
    pub fn force(&mut self, handle: ActorHandle) {
        if self.queued.contains(&handle) {
            self.queue.retain(|h| *h != handle);
        } else {
            self.queued.insert(handle);
        }
        self.queue.push_front(handle);
        self.forced.insert(handle);
    }

    /// Reports actors unsynced for at least `time_maximum_unsynced` and forces
    /// them to the front. Excluded actors are included: staleness overrides
    /// classification. Actors first seen here start their clock at `now`.
    /// An actor that stays unsynced, e.g. because its state cannot be read,
    /// is reported again only after another full period.
    pub fn collect_stale(&mut self, now: f64, registry: &Registry) -> Vec<ReplicationError> {
        let mut stale: Vec<(ActorId, ActorHandle, f64)> = Vec::new();
        for (handle, id) in registry.handles() {
            let last = *self.last_synced.entry(id).or_insert(now);
            let unsynced_for = now - last;
            let since_warned = self
                .last_warned
                .get(&id)
                .map_or(f64::INFINITY, |t| now - *t);
            if unsynced_for >= self.max_unsynced
                && since_warned >= self.max_unsynced
                && !self.forced.contains(&handle)
            {
                stale.push((id, handle, unsynced_for));
            }
        }
        stale.sort_unstable_by_key(|(id, _, _)| *id);

        for (id, handle, unsynced_for) in stale.iter().rev() {
            warn!(actor = %id, unsynced_for, "Actor stale, forcing resync");
            self.force(*handle);
            self.last_warned.insert(*id, now);
        }
        stale
            .into_iter()
            .map(|(actor, _, unsynced_for)| ReplicationError::StaleActor {
                actor,
                unsynced_for,
            })
            .collect()
    }

    /// Dequeues up to `budget` handles (`None` = everything).
    pub fn drain(&mut self, budget: Option<usize>) -> Vec<ActorHandle> {
        let n = budget.unwrap_or(self.queue.len()).min(self.queue.len());
        let out: Vec<ActorHandle> = self.queue.drain(..n).collect();
        for handle in &out {
            self.queued.remove(handle);
            self.forced.remove(handle);
        }
        if !self.queue.is_empty() {
            debug!(sent = n, deferred = self.queue.len(), "Sync budget exhausted");
        }
        out
    }

    pub fn mark_synced(&mut self, id: ActorId, now: f64) {
        self.last_synced.insert(id, now);
        self.last_warned.remove(&id);
    }

    pub fn last_synced(&self, id: ActorId) -> Option<f64> {
        self.last_synced.get(&id).copied()
    }

    /// Drops every trace of a deregistered actor.
    pub fn forget(&mut self, id: ActorId, handle: Option<ActorHandle>) {
        self.last_synced.remove(&id);
        self.last_warned.remove(&id);
        if let Some(handle) = handle {
            if self.queued.remove(&handle) {
                self.queue.retain(|h| *h != handle);
            }
            self.forced.remove(&handle);
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Queue contents front to back.
    pub fn queued(&self) -> impl Iterator<Item = ActorHandle> + '_ {
        self.queue.iter().copied()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.queued.clear();
        self.forced.clear();
        self.last_synced.clear();
        self.last_warned.clear();
    }
}
