//! Fixed-layout binary codec for kinematic state and snapshots.
//!
//! Layout (little-endian IEEE-754, no quantization):
//!
//! ```text
//! state    = position(3 f32) linear_velocity(3 f32) rotation(x y z w f32) angular_velocity(3 f32)
//!          = 13 * 4 = 52 bytes
//! snapshot = timestamp(f64) state = 60 bytes
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    error::{Malformed, ReplicationError},
    math::{Quat, Vec3},
    state::{KinematicState, Snapshot},
};

/// Encoded size of a [`KinematicState`].
pub const STATE_LEN: usize = 13 * 4;
/// Encoded size of a [`Snapshot`].
pub const SNAPSHOT_LEN: usize = 8 + STATE_LEN;

fn put_vec3(buf: &mut impl BufMut, v: Vec3) {
    buf.put_f32_le(v.x);
    buf.put_f32_le(v.y);
    buf.put_f32_le(v.z);
}

fn get_vec3(buf: &mut impl Buf) -> Vec3 {
    let x = buf.get_f32_le();
    let y = buf.get_f32_le();
    let z = buf.get_f32_le();
    Vec3::new(x, y, z)
}

/// Appends the 52-byte state encoding.
pub fn put_state(buf: &mut impl BufMut, state: &KinematicState) {
    put_vec3(buf, state.position);
    put_vec3(buf, state.linear_velocity);
    buf.put_f32_le(state.rotation.x);
    buf.put_f32_le(state.rotation.y);
    buf.put_f32_le(state.rotation.z);
    buf.put_f32_le(state.rotation.w);
    put_vec3(buf, state.angular_velocity);
}

/// Reads one state, advancing `buf`. Fails without consuming on short input.
pub fn get_state(buf: &mut impl Buf) -> Result<KinematicState, ReplicationError> {
    if buf.remaining() < STATE_LEN {
        return Err(ReplicationError::MalformedSnapshot(Malformed::Truncated {
            expected: STATE_LEN,
            actual: buf.remaining(),
        }));
    }
    let position = get_vec3(buf);
    let linear_velocity = get_vec3(buf);
    let x = buf.get_f32_le();
    let y = buf.get_f32_le();
    let z = buf.get_f32_le();
    let w = buf.get_f32_le();
    let angular_velocity = get_vec3(buf);
    Ok(KinematicState {
        position,
        rotation: Quat::new(x, y, z, w),
        linear_velocity,
        angular_velocity,
    })
}

pub fn encode_state(state: &KinematicState) -> Bytes {
    let mut buf = BytesMut::with_capacity(STATE_LEN);
    put_state(&mut buf, state);
    buf.freeze()
}

pub fn decode_state(mut bytes: &[u8]) -> Result<KinematicState, ReplicationError> {
    get_state(&mut bytes)
}

pub fn put_snapshot(buf: &mut impl BufMut, snap: &Snapshot) {
    buf.put_f64_le(snap.timestamp);
    put_state(buf, &snap.state);
}

/// Reads one snapshot. Fails on short input or a non-finite timestamp.
pub fn get_snapshot(buf: &mut impl Buf) -> Result<Snapshot, ReplicationError> {
    if buf.remaining() < SNAPSHOT_LEN {
        return Err(ReplicationError::MalformedSnapshot(Malformed::Truncated {
            expected: SNAPSHOT_LEN,
            actual: buf.remaining(),
        }));
    }
    let timestamp = buf.get_f64_le();
    let state = get_state(buf)?;
    if !timestamp.is_finite() {
        return Err(ReplicationError::MalformedSnapshot(
            Malformed::NonFiniteTimestamp,
        ));
    }
    Ok(Snapshot { timestamp, state })
}

pub fn encode_snapshot(snap: &Snapshot) -> Bytes {
    let mut buf = BytesMut::with_capacity(SNAPSHOT_LEN);
    put_snapshot(&mut buf, snap);
    buf.freeze()
}

pub fn decode_snapshot(mut bytes: &[u8]) -> Result<Snapshot, ReplicationError> {
    get_snapshot(&mut bytes)
}
