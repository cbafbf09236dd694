//! Reconstruction strategies.
//!
//! Pure functions from (previous local state, received history) to the state
//! the observer applies to its local actor.
//!
//! - `Snap`: take the newest remote state verbatim.
//! - `FirstOrder`: blend toward it by a fixed factor.
//! - `Phbe`: predictive Hermite-based extrapolation. Extrapolates the three
//!   newest positions quadratically one inter-sample step at a time until the
//!   prediction reaches the present, hiding the age of the data.

use tracing::debug;

use crate::{
    config::StrategyKind,
    error::ReplicationError,
    history::History,
    math::Vec3,
    state::KinematicState,
};

/// Samples PHBE needs before it engages.
pub const PHBE_MIN_SAMPLES: usize = 4;
/// Upper bound on synthetic steps per prediction.
pub const MAX_PHBE_STEPS: usize = 256;

pub fn snap(latest: &KinematicState) -> KinematicState {
    *latest
}

/// Lerps position and both velocities, slerps rotation.
pub fn first_order(previous: &KinematicState, latest: &KinematicState, alpha: f32) -> KinematicState {
    KinematicState {
        position: previous.position.lerp(latest.position, alpha),
        rotation: previous.rotation.slerp(latest.rotation, alpha),
        linear_velocity: previous.linear_velocity.lerp(latest.linear_velocity, alpha),
        angular_velocity: previous.angular_velocity.lerp(latest.angular_velocity, alpha),
    }
}

/// One extrapolated sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub timestamp: f64,
    pub position: Vec3,
    pub velocity: Vec3,
    /// Synthetic steps taken to reach `timestamp`.
    pub steps: usize,
}

#[derive(Clone, Copy)]
struct Sample {
    t: f64,
    pos: Vec3,
}

/// Quadratic extrapolation of `w[0..3]` (newest first) to `t0 + d1`.
fn hermite_step(w: &[Sample; 3]) -> (Sample, Vec3) {
    let d1 = w[0].t - w[1].t;
    let d2 = w[1].t - w[2].t;

    let w1 = 2.0 * d1 * d1 / (d2 * (d1 + d2));
    let w2 = 2.0 * d1 / d2 + 1.0;
    let w3 = 2.0 * d1 / (d1 + d2) + 1.0;

    let position = w[2].pos * w1 as f32 - w[1].pos * w2 as f32 + w[0].pos * (w3 + 1.0) as f32;
    let inv = (1.0 / d1) as f32;
    let velocity =
        w[1].pos * (0.5 * inv) - w[0].pos * (2.0 * inv) + position * (1.5 * inv);

    (
        Sample {
            t: w[0].t + d1,
            pos: position,
        },
        velocity,
    )
}

/// Predicts position and velocity at the first synthetic step at or past `now`.
pub fn phbe_predict(history: &History, now: f64) -> Result<Prediction, ReplicationError> {
    if history.len() < PHBE_MIN_SAMPLES {
        return Err(ReplicationError::InsufficientHistory {
            available: history.len(),
        });
    }
    let sample = |i: usize| {
        history.get(i).map(|s| Sample {
            t: s.timestamp,
            pos: s.state.position,
        })
    };
    let (Some(s0), Some(s1), Some(s2)) = (sample(0), sample(1), sample(2)) else {
        return Err(ReplicationError::InsufficientHistory {
            available: history.len(),
        });
    };

    let mut window = [s0, s1, s2];
    let mut steps = 0;
    loop {
        let (next, velocity) = hermite_step(&window);
        steps += 1;
        if next.t >= now || steps >= MAX_PHBE_STEPS {
            if next.t < now {
                debug!(
                    steps,
                    reached = next.t,
                    now,
                    "PHBE step limit hit before the present"
                );
            }
            return Ok(Prediction {
                timestamp: next.t,
                position: next.pos,
                velocity,
                steps,
            });
        }
        window = [next, window[0], window[1]];
    }
}

/// Full PHBE state: predicted position and velocity, rotation carried forward
/// by the newest angular velocity over the same lead time.
pub fn phbe(history: &History, now: f64) -> Result<KinematicState, ReplicationError> {
    let prediction = phbe_predict(history, now)?;
    let newest = history
        .latest()
        .ok_or(ReplicationError::InsufficientHistory { available: 0 })?;
    let lead = (prediction.timestamp - newest.timestamp) as f32;
    Ok(KinematicState {
        position: prediction.position,
        rotation: newest
            .state
            .rotation
            .integrate(newest.state.angular_velocity, lead),
        linear_velocity: prediction.velocity,
        angular_velocity: newest.state.angular_velocity,
    })
}

/// Runs `strategy`. PHBE without enough history degrades to first order.
/// Returns `None` only when the history is empty.
pub fn reconstruct(
    strategy: StrategyKind,
    previous: &KinematicState,
    history: &History,
    now: f64,
    alpha: f32,
) -> Option<KinematicState> {
    let latest = history.latest()?.state;
    let state = match strategy {
        StrategyKind::Snap => snap(&latest),
        StrategyKind::FirstOrder => first_order(previous, &latest, alpha),
        StrategyKind::Phbe => match phbe(history, now) {
            Ok(state) => state,
            Err(_) => first_order(previous, &latest, alpha),
        },
    };
    Some(state)
}
