//! Object registry and priority classifier.
//!
//! Tracked actors live in a generational arena. Each classification pass
//! throws the previous partition away and rebuilds it from current positions,
//! so actors destroyed behind our back can never linger in a tier.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::ReplicationConfig,
    ids::{ActorHandle, ActorId, Arena},
    math::Vec3,
    world::ActorAccessor,
};

/// Sync urgency bucket in `[1, 10]`; higher is more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriorityTier(u8);

impl PriorityTier {
    pub const MIN: Self = Self(1);
    pub const MAX: Self = Self(10);
    pub const COUNT: usize = 10;

    /// Unchecked; see [`PriorityTier::is_valid`] and [`PriorityTier::clamped`].
    pub const fn new(tier: u8) -> Self {
        Self(tier)
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        (Self::MIN.0..=Self::MAX.0).contains(&self.0)
    }

    pub fn clamped(self) -> Self {
        Self(self.0.clamp(Self::MIN.0, Self::MAX.0))
    }

    /// All tiers, most urgent first.
    pub fn by_urgency() -> impl Iterator<Item = Self> {
        (Self::MIN.0..=Self::MAX.0).rev().map(Self)
    }
}

impl fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Outcome of classifying one actor. `Excluded` ranks below every tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Classification {
    Excluded,
    Tier(PriorityTier),
}

struct TrackedActor {
    id: ActorId,
    default_tier: PriorityTier,
    class: Classification,
}

/// Proximity thresholds used by [`Registry::rebuild`].
#[derive(Debug, Clone, Copy)]
pub struct ClassifierPolicy {
    pub no_sync_radius: f32,
    pub priority_radius: f32,
    pub high_priority_tier: PriorityTier,
    pub enabled: bool,
}

impl ClassifierPolicy {
    pub fn from_config(cfg: &ReplicationConfig) -> Self {
        Self {
            no_sync_radius: cfg.no_sync_radius,
            priority_radius: cfg.priority_radius,
            high_priority_tier: cfg.high_priority_tier.clamped(),
            enabled: cfg.prioritize_by_distance,
        }
    }

    /// Classifies one actor against every point of interest; the most urgent
    /// verdict wins.
    pub fn classify(
        &self,
        position: Vec3,
        points: &[Vec3],
        default_tier: PriorityTier,
    ) -> Classification {
        if !self.enabled {
            return Classification::Tier(default_tier);
        }
        let high = self.high_priority_tier.max(default_tier);
        points
            .iter()
            .map(|poi| {
                let d = poi.distance(position);
                if d < self.no_sync_radius {
                    Classification::Excluded
                } else if d < self.priority_radius {
                    Classification::Tier(high)
                } else {
                    Classification::Tier(default_tier)
                }
            })
            .max()
            .unwrap_or(Classification::Tier(default_tier))
    }
}

/// Tracked actors partitioned into tiers plus an excluded set.
pub struct Registry {
    policy: ClassifierPolicy,
    actors: Arena<TrackedActor>,
    by_id: HashMap<ActorId, ActorHandle>,
    tiers: BTreeMap<PriorityTier, Vec<ActorHandle>>,
    excluded: Vec<ActorHandle>,
}

impl Registry {
    pub fn new(policy: ClassifierPolicy) -> Self {
        Self {
            policy,
            actors: Arena::new(),
            by_id: HashMap::new(),
            tiers: BTreeMap::new(),
            excluded: Vec::new(),
        }
    }

    pub fn from_config(cfg: &ReplicationConfig) -> Self {
        Self::new(ClassifierPolicy::from_config(cfg))
    }

    pub fn policy(&self) -> &ClassifierPolicy {
        &self.policy
    }

    /// Starts tracking `id`. Re-registering updates the default tier and
    /// keeps the existing handle. The actor joins a tier on the next rebuild.
    pub fn register(&mut self, id: ActorId, default_tier: PriorityTier) -> ActorHandle {
        let default_tier = default_tier.clamped();
        if let Some(&handle) = self.by_id.get(&id) {
            if let Some(actor) = self.actors.get_mut(handle) {
                actor.default_tier = default_tier;
            }
            return handle;
        }
        let handle = self.actors.insert(TrackedActor {
            id,
            default_tier,
            class: Classification::Tier(default_tier),
        });
        self.by_id.insert(id, handle);
        debug!(actor = %id, tier = %default_tier, "Actor registered");
        handle
    }

    /// Stops tracking `id` and purges its tier membership immediately.
    pub fn deregister(&mut self, id: ActorId) -> bool {
        let Some(handle) = self.by_id.remove(&id) else {
            return false;
        };
        self.actors.remove(handle);
        for members in self.tiers.values_mut() {
            members.retain(|h| *h != handle);
        }
        self.excluded.retain(|h| *h != handle);
        debug!(actor = %id, "Actor deregistered");
        true
    }

    /// Reclassifies every tracked actor from scratch.
    pub fn rebuild(&mut self, accessor: &dyn ActorAccessor, points: &[Vec3]) {
        self.tiers.clear();
        self.excluded.clear();

        let mut entries: Vec<(ActorId, ActorHandle, PriorityTier)> = self
            .actors
            .iter()
            .map(|(handle, actor)| (actor.id, handle, actor.default_tier))
            .collect();
        entries.sort_unstable_by_key(|(id, _, _)| *id);

        for (id, handle, default_tier) in entries {
            let class = match accessor.get_state(id) {
                Some(state) => self.policy.classify(state.position, points, default_tier),
                None => Classification::Tier(default_tier),
            };
            if let Some(actor) = self.actors.get_mut(handle) {
                actor.class = class;
            }
            match class {
                Classification::Excluded => self.excluded.push(handle),
                Classification::Tier(tier) => self.tiers.entry(tier).or_default().push(handle),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    pub fn contains(&self, id: ActorId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn handle_of(&self, id: ActorId) -> Option<ActorHandle> {
        self.by_id.get(&id).copied()
    }

    /// Maps a handle back to its actor; stale handles miss.
    pub fn resolve(&self, handle: ActorHandle) -> Option<ActorId> {
        self.actors.get(handle).map(|a| a.id)
    }

    /// Classification from the last rebuild.
    pub fn classification(&self, id: ActorId) -> Option<Classification> {
        let handle = self.handle_of(id)?;
        self.actors.get(handle).map(|a| a.class)
    }

    pub fn tier_of(&self, id: ActorId) -> Option<PriorityTier> {
        match self.classification(id)? {
            Classification::Tier(tier) => Some(tier),
            Classification::Excluded => None,
        }
    }

    pub fn is_excluded(&self, id: ActorId) -> bool {
        self.classification(id) == Some(Classification::Excluded)
    }

    pub fn members(&self, tier: PriorityTier) -> &[ActorHandle] {
        self.tiers.get(&tier).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn excluded(&self) -> &[ActorHandle] {
        &self.excluded
    }

    /// Every tracked handle, tiers and excluded alike.
    pub fn handles(&self) -> impl Iterator<Item = (ActorHandle, ActorId)> + '_ {
        self.actors.iter().map(|(h, a)| (h, a.id))
    }

    /// Tracked ids in ascending order.
    pub fn actor_ids(&self) -> Vec<ActorId> {
        let mut ids: Vec<ActorId> = self.by_id.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn clear(&mut self) {
        self.actors.clear();
        self.by_id.clear();
        self.tiers.clear();
        self.excluded.clear();
    }
}
