//! Physics abstraction.
//!
//! Replication never simulates; the host's physics owns motion. This is the
//! minimal stepper the demo binaries and tests drive the host world with.

use crate::{
    math::Vec3,
    world::{ActorTags, World},
};

/// Physics parameters.
#[derive(Debug, Clone, Copy)]
pub struct PhysicsConfig {
    pub gravity: Vec3,
    /// Height of an infinite floor on the z axis; `None` = free fall forever.
    pub floor_z: Option<f32>,
    /// Fraction of vertical speed kept on a floor bounce.
    pub restitution: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, 0.0, -9.81),
            floor_z: Some(0.0),
            restitution: 0.5,
        }
    }
}

/// Physics stepper trait.
pub trait PhysicsBackend: Send + Sync {
    fn step(&mut self, world: &mut World, dt_sec: f32);
}

/// No-op physics.
#[derive(Default)]
pub struct NullPhysics;

impl PhysicsBackend for NullPhysics {
    fn step(&mut self, _world: &mut World, _dt_sec: f32) {}
}

/// Semi-implicit Euler over every tracked, non-player actor.
#[derive(Debug, Default)]
pub struct Ballistic {
    pub cfg: PhysicsConfig,
}

impl Ballistic {
    pub fn new(cfg: PhysicsConfig) -> Self {
        Self { cfg }
    }
}

impl PhysicsBackend for Ballistic {
    fn step(&mut self, world: &mut World, dt_sec: f32) {
        for (_, actor) in world.iter_mut() {
            if !actor.tags.contains(ActorTags::TRACKED) || actor.tags.contains(ActorTags::PLAYER) {
                continue;
            }
            let s = &mut actor.state;
            s.linear_velocity += self.cfg.gravity * dt_sec;
            s.position += s.linear_velocity * dt_sec;
            s.rotation = s.rotation.integrate(s.angular_velocity, dt_sec);

            if let Some(floor) = self.cfg.floor_z {
                if s.position.z < floor {
                    s.position.z = floor;
                    if s.linear_velocity.z < 0.0 {
                        s.linear_velocity.z = -s.linear_velocity.z * self.cfg.restitution;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ids::ActorId, state::KinematicState, world::ActorAccessor};

    #[test]
    fn ballistic_moves_tracked_actors_only() {
        let mut world = World::default();
        world.insert_tracked(
            ActorId(1),
            KinematicState::at(Vec3::new(0.0, 0.0, 10.0)).with_velocity(Vec3::new(1.0, 0.0, 0.0)),
        );
        world.insert(
            ActorId(2),
            KinematicState::at(Vec3::new(0.0, 0.0, 10.0)),
            ActorTags::TRACKED | ActorTags::PLAYER,
        );
        let mut physics = Ballistic::new(PhysicsConfig {
            gravity: Vec3::new(0.0, 0.0, -10.0),
            floor_z: None,
            restitution: 0.0,
        });
        physics.step(&mut world, 0.5);

        let moved = world.get_state(ActorId(1)).unwrap();
        assert_eq!(moved.linear_velocity, Vec3::new(1.0, 0.0, -5.0));
        assert_eq!(moved.position, Vec3::new(0.5, 0.0, 7.5));
        assert_eq!(world.get_state(ActorId(2)).unwrap().position.z, 10.0);
    }

    #[test]
    fn floor_stops_and_bounces() {
        let mut world = World::default();
        world.insert_tracked(
            ActorId(1),
            KinematicState::at(Vec3::new(0.0, 0.0, 0.1)).with_velocity(Vec3::new(0.0, 0.0, -4.0)),
        );
        let mut physics = Ballistic::new(PhysicsConfig {
            gravity: Vec3::ZERO,
            floor_z: Some(0.0),
            restitution: 0.5,
        });
        physics.step(&mut world, 0.1);
        let s = world.get_state(ActorId(1)).unwrap();
        assert_eq!(s.position.z, 0.0);
        assert_eq!(s.linear_velocity.z, 2.0);
    }
}
