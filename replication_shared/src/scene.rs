//! Demo scene: a field of cubes and one player walking a circle through it.
//!
//! Host and observers build the scene from the same seed, so both sides agree
//! on every `ActorId` before the first packet is exchanged.

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    ids::ActorId,
    math::Vec3,
    state::KinematicState,
    world::{ActorTags, World},
};

/// The player actor. Cubes are numbered from 1.
pub const PLAYER_ID: ActorId = ActorId(0);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub cubes: u32,
    /// Cube coordinates are integers drawn from `[min, max)` on each axis.
    pub min: i32,
    pub max: i32,
    pub seed: u64,
    pub player_orbit_radius: f32,
    /// Seconds per lap; zero keeps the player still at the origin.
    pub player_orbit_period: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            cubes: 64,
            min: -20,
            max: 20,
            seed: 1,
            player_orbit_radius: 12.0,
            player_orbit_period: 20.0,
        }
    }
}

/// Builds the world: `cubes` tracked actors plus the player.
pub fn build(cfg: &SceneConfig) -> World {
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let (min, max) = if cfg.min < cfg.max {
        (cfg.min, cfg.max)
    } else {
        (cfg.min, cfg.min + 1)
    };
    let mut world = World::default();
    for i in 1..=cfg.cubes {
        let position = Vec3::new(
            rng.gen_range(min..max) as f32,
            rng.gen_range(min..max) as f32,
            rng.gen_range(min..max) as f32,
        );
        world.insert_tracked(ActorId(i), KinematicState::at(position));
    }
    world.insert(
        PLAYER_ID,
        KinematicState::at(player_position(cfg, 0.0)),
        ActorTags::PLAYER,
    );
    world
}

/// Where the player stands at `t` seconds.
pub fn player_position(cfg: &SceneConfig, t: f64) -> Vec3 {
    if cfg.player_orbit_period <= 0.0 {
        return Vec3::ZERO;
    }
    let phase = (t / f64::from(cfg.player_orbit_period)) * std::f64::consts::TAU;
    Vec3::new(
        cfg.player_orbit_radius * phase.cos() as f32,
        cfg.player_orbit_radius * phase.sin() as f32,
        0.0,
    )
}

/// Moves the player to its position at `t`.
pub fn move_player(world: &mut World, cfg: &SceneConfig, t: f64) {
    if let Some(player) = world.get_mut(PLAYER_ID) {
        player.state.position = player_position(cfg, t);
    }
}
