//! `replication_shared`
//!
//! Priority-based state replication for networked rigid bodies, shared by
//! host and observer.
//!
//! Design goals:
//! - Deterministic and modular where practical.
//! - Clear separation of concerns (codec, registry, scheduler, reconstruction,
//!   session, transport).
//! - Traits at the host-runtime seams: [`world::ActorAccessor`],
//!   [`world::PointsOfInterest`], [`net::Channel`].
//! - No `unsafe`.

pub mod codec;
pub mod config;
pub mod error;
pub mod history;
pub mod ids;
pub mod math;
pub mod net;
pub mod physics;
pub mod reconstruct;
pub mod registry;
pub mod scene;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod world;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::error::{Malformed, ReplicationError};
    pub use crate::ids::{ActorHandle, ActorId};
    pub use crate::math::*;
    pub use crate::net::{Channel, LoopbackChannel, LossyChannel, Packet};
    pub use crate::registry::{Classification, PriorityTier, Registry};
    pub use crate::session::{ReplicationSession, Role, TickOutcome, TickReport};
    pub use crate::state::{KinematicState, Snapshot};
    pub use crate::world::{ActorAccessor, ActorTags, PointsOfInterest, World};
}
