//! Networking primitives.
//!
//! Goals:
//! - Provide the packet envelope exchanged by host and observers.
//! - Abstract the unreliable transport behind a non-blocking [`Channel`].
//! - Keep serialization explicit and versionable.
//!
//! Reliability and congestion control are absent: channels may
//! drop, duplicate or reorder messages and the session copes.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::{
    codec::{self, SNAPSHOT_LEN},
    error::{Malformed, ReplicationError},
    ids::ActorId,
    state::Snapshot,
};

const TAG_SNAPSHOT: u8 = 0x01;
const TAG_SHARE_REGISTRY: u8 = 0x02;
const TAG_RESYNC_REQUEST: u8 = 0x03;
const TAG_HELLO: u8 = 0x04;

/// Upper bound on ids in one list packet; keeps a list inside one datagram.
/// Lists are never split, a partial `ShareRegistry` would drop actors.
pub const MAX_IDS_PER_PACKET: usize = 16_000;

/// High-level message envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Host -> observer: one actor's state at host time `snapshot.timestamp`.
    Snapshot { actor: ActorId, snapshot: Snapshot },
    /// Host -> observer: every actor the host tracks.
    ShareRegistry { actor_ids: Vec<ActorId> },
    /// Observer -> host: please resend these actors out of schedule.
    ResyncRequest { actor_ids: Vec<ActorId> },
    /// Observer -> host transport: announce this peer.
    Hello,
}

/// Callers keep `ids` within [`MAX_IDS_PER_PACKET`]; the session caps its
/// registry at that size, which bounds both list packets.
fn put_ids(buf: &mut BytesMut, ids: &[ActorId]) {
    debug_assert!(ids.len() <= MAX_IDS_PER_PACKET);
    buf.put_u32_le(ids.len() as u32);
    for id in ids {
        buf.put_u32_le(id.0);
    }
}

fn get_ids(buf: &mut &[u8]) -> Result<Vec<ActorId>, ReplicationError> {
    if buf.remaining() < 4 {
        return Err(ReplicationError::MalformedSnapshot(Malformed::Truncated {
            expected: 4,
            actual: buf.remaining(),
        }));
    }
    let count = buf.get_u32_le() as usize;
    if count > MAX_IDS_PER_PACKET {
        return Err(ReplicationError::MalformedSnapshot(Malformed::TooManyIds {
            count,
            max: MAX_IDS_PER_PACKET,
        }));
    }
    if buf.remaining() < count * 4 {
        return Err(ReplicationError::MalformedSnapshot(Malformed::Truncated {
            expected: count * 4,
            actual: buf.remaining(),
        }));
    }
    Ok((0..count).map(|_| ActorId(buf.get_u32_le())).collect())
}

impl Packet {
    pub fn encode(&self) -> Bytes {
        match self {
            Packet::Snapshot { actor, snapshot } => {
                let mut buf = BytesMut::with_capacity(1 + 4 + SNAPSHOT_LEN);
                buf.put_u8(TAG_SNAPSHOT);
                buf.put_u32_le(actor.0);
                codec::put_snapshot(&mut buf, snapshot);
                buf.freeze()
            }
            Packet::ShareRegistry { actor_ids } | Packet::ResyncRequest { actor_ids } => {
                let tag = if matches!(self, Packet::ShareRegistry { .. }) {
                    TAG_SHARE_REGISTRY
                } else {
                    TAG_RESYNC_REQUEST
                };
                let mut buf = BytesMut::with_capacity(1 + 4 + 4 * actor_ids.len());
                buf.put_u8(tag);
                put_ids(&mut buf, actor_ids);
                buf.freeze()
            }
            Packet::Hello => Bytes::from_static(&[TAG_HELLO]),
        }
    }

    pub fn decode(mut bytes: &[u8]) -> Result<Self, ReplicationError> {
        let total = bytes.len();
        if bytes.is_empty() {
            return Err(ReplicationError::MalformedSnapshot(Malformed::Truncated {
                expected: 1,
                actual: 0,
            }));
        }
        let packet = match bytes.get_u8() {
            TAG_SNAPSHOT => {
                if bytes.remaining() < 4 + SNAPSHOT_LEN {
                    return Err(ReplicationError::MalformedSnapshot(Malformed::Truncated {
                        expected: 1 + 4 + SNAPSHOT_LEN,
                        actual: total,
                    }));
                }
                let actor = ActorId(bytes.get_u32_le());
                let snapshot = codec::get_snapshot(&mut bytes)?;
                Packet::Snapshot { actor, snapshot }
            }
            TAG_SHARE_REGISTRY => Packet::ShareRegistry {
                actor_ids: get_ids(&mut bytes)?,
            },
            TAG_RESYNC_REQUEST => Packet::ResyncRequest {
                actor_ids: get_ids(&mut bytes)?,
            },
            TAG_HELLO => Packet::Hello,
            tag => return Err(ReplicationError::MalformedSnapshot(Malformed::UnknownTag(tag))),
        };
        if bytes.has_remaining() {
            return Err(ReplicationError::MalformedSnapshot(Malformed::TrailingBytes {
                expected: total - bytes.remaining(),
                actual: total,
            }));
        }
        Ok(packet)
    }
}

/// Non-blocking, message-oriented, unreliable transport.
///
/// Both calls return immediately. The only error is
/// [`ReplicationError::ChannelClosed`].
pub trait Channel {
    fn send(&mut self, bytes: Bytes) -> Result<(), ReplicationError>;

    /// `Ok(None)` when nothing is waiting this tick.
    fn try_receive(&mut self) -> Result<Option<Bytes>, ReplicationError>;
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn send(&mut self, bytes: Bytes) -> Result<(), ReplicationError> {
        (**self).send(bytes)
    }

    fn try_receive(&mut self) -> Result<Option<Bytes>, ReplicationError> {
        (**self).try_receive()
    }
}

/// In-process channel end. Dropping one end closes the other once drained.
#[derive(Debug)]
pub struct LoopbackChannel {
    tx: mpsc::UnboundedSender<Bytes>,
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl LoopbackChannel {
    /// Two connected ends.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            Self { tx: a_tx, rx: a_rx },
            Self { tx: b_tx, rx: b_rx },
        )
    }
}

impl Channel for LoopbackChannel {
    fn send(&mut self, bytes: Bytes) -> Result<(), ReplicationError> {
        self.tx
            .send(bytes)
            .map_err(|_| ReplicationError::ChannelClosed)
    }

    fn try_receive(&mut self) -> Result<Option<Bytes>, ReplicationError> {
        match self.rx.try_recv() {
            Ok(bytes) => Ok(Some(bytes)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ReplicationError::ChannelClosed),
        }
    }
}

/// Wraps a channel and drops or duplicates outgoing messages at random.
pub struct LossyChannel<C> {
    inner: C,
    drop_rate: f64,
    duplicate_rate: f64,
    rng: StdRng,
}

impl<C: Channel> LossyChannel<C> {
    pub fn new(inner: C, drop_rate: f64, duplicate_rate: f64, seed: u64) -> Self {
        Self {
            inner,
            drop_rate: drop_rate.clamp(0.0, 1.0),
            duplicate_rate: duplicate_rate.clamp(0.0, 1.0),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C: Channel> Channel for LossyChannel<C> {
    fn send(&mut self, bytes: Bytes) -> Result<(), ReplicationError> {
        if self.rng.gen_bool(self.drop_rate) {
            return Ok(());
        }
        if self.rng.gen_bool(self.duplicate_rate) {
            self.inner.send(bytes.clone())?;
        }
        self.inner.send(bytes)
    }

    fn try_receive(&mut self) -> Result<Option<Bytes>, ReplicationError> {
        self.inner.try_receive()
    }
}
