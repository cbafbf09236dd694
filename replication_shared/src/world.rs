//! Actor world and the collaborator traits the engine talks through.
//!
//! The engine never simulates physics. It reads and writes kinematic state
//! through [`ActorAccessor`] and asks [`PointsOfInterest`] where observers
//! are. [`World`] is a small in-memory implementation of both, used by the
//! binaries and tests; a real host plugs in its own scene graph.

use std::collections::BTreeMap;

use crate::{ids::ActorId, math::Vec3, state::KinematicState};

/// Read/write access to physical actors. Missing actors are lookup-misses.
pub trait ActorAccessor {
    fn get_state(&self, id: ActorId) -> Option<KinematicState>;

    /// Returns false when `id` does not exist.
    fn set_state(&mut self, id: ActorId, state: KinematicState) -> bool;
}

/// Current observer positions, queried once per classification pass.
pub trait PointsOfInterest {
    fn points_of_interest(&self) -> Vec<Vec3>;
}

impl PointsOfInterest for Vec<Vec3> {
    fn points_of_interest(&self) -> Vec<Vec3> {
        self.clone()
    }
}

bitflags::bitflags! {
    /// Actor tags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ActorTags: u32 {
        const NONE = 0;
        const TRACKED = 1 << 0;  // Replicated by the engine
        const PLAYER = 1 << 1;   // Counts as a point of interest
    }
}

impl Default for ActorTags {
    fn default() -> Self {
        Self::NONE
    }
}

/// One actor in the world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Actor {
    pub state: KinematicState,
    pub tags: ActorTags,
}

/// Simple actor table keyed by id, iterated in id order.
#[derive(Default)]
pub struct World {
    actors: BTreeMap<ActorId, Actor>,
}

impl World {
    /// Inserts/replaces an actor.
    pub fn insert(&mut self, id: ActorId, state: KinematicState, tags: ActorTags) {
        self.actors.insert(id, Actor { state, tags });
    }

    pub fn insert_tracked(&mut self, id: ActorId, state: KinematicState) {
        self.insert(id, state, ActorTags::TRACKED);
    }

    pub fn remove(&mut self, id: ActorId) -> Option<Actor> {
        self.actors.remove(&id)
    }

    pub fn get(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(&id)
    }

    pub fn get_mut(&mut self, id: ActorId) -> Option<&mut Actor> {
        self.actors.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActorId, &Actor)> {
        self.actors.iter().map(|(k, v)| (*k, v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ActorId, &mut Actor)> {
        self.actors.iter_mut().map(|(k, v)| (*k, v))
    }

    /// Ids carrying every flag in `tags`.
    pub fn with_tags(&self, tags: ActorTags) -> Vec<ActorId> {
        self.iter()
            .filter(|(_, a)| a.tags.contains(tags))
            .map(|(id, _)| id)
            .collect()
    }
}

impl ActorAccessor for World {
    fn get_state(&self, id: ActorId) -> Option<KinematicState> {
        self.actors.get(&id).map(|a| a.state)
    }

    fn set_state(&mut self, id: ActorId, state: KinematicState) -> bool {
        match self.actors.get_mut(&id) {
            Some(actor) => {
                actor.state = state;
                true
            }
            None => false,
        }
    }
}

impl PointsOfInterest for World {
    fn points_of_interest(&self) -> Vec<Vec3> {
        self.iter()
            .filter(|(_, a)| a.tags.contains(ActorTags::PLAYER))
            .map(|(_, a)| a.state.position)
            .collect()
    }
}
