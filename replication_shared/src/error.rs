//! Replication error taxonomy.
//!
//! Only [`ReplicationError::ChannelClosed`] ends a session. Everything else is
//! reported per message or per actor and the tick carries on.

use std::fmt;

use crate::ids::ActorId;

/// What was wrong with a rejected message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformed {
    /// Fewer bytes than the layout needs.
    Truncated { expected: usize, actual: usize },
    /// Bytes left over after a complete message.
    TrailingBytes { expected: usize, actual: usize },
    UnknownTag(u8),
    /// An id list longer than one packet may carry.
    TooManyIds { count: usize, max: usize },
    /// NaN or infinite snapshot timestamp.
    NonFiniteTimestamp,
}

impl fmt::Display for Malformed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Malformed::Truncated { expected, actual } => {
                write!(f, "expected {expected} bytes, got {actual}")
            }
            Malformed::TrailingBytes { expected, actual } => {
                write!(f, "{} trailing bytes after {expected}", actual - expected)
            }
            Malformed::UnknownTag(tag) => write!(f, "unknown packet tag {tag:#04x}"),
            Malformed::TooManyIds { count, max } => {
                write!(f, "{count} ids in one packet, at most {max}")
            }
            Malformed::NonFiniteTimestamp => write!(f, "non-finite timestamp"),
        }
    }
}

/// Errors raised by the replication engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicationError {
    /// Truncated or corrupt bytes. The message is skipped.
    MalformedSnapshot(Malformed),
    /// A snapshot names an actor this side does not track. Dropped.
    UnknownActor(ActorId),
    /// PHBE asked for with too few samples. Callers fall back to first order.
    InsufficientHistory { available: usize },
    /// No snapshot sent/received within `time_maximum_unsynced`.
    StaleActor { actor: ActorId, unsynced_for: f64 },
    /// The session already committed to a role.
    RoleLocked,
    /// The underlying channel is gone.
    ChannelClosed,
}

impl ReplicationError {
    /// True for everything except channel closure.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ReplicationError::ChannelClosed)
    }
}

impl fmt::Display for ReplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicationError::MalformedSnapshot(detail) => {
                write!(f, "malformed snapshot: {detail}")
            }
            ReplicationError::UnknownActor(id) => write!(f, "unknown actor {id}"),
            ReplicationError::InsufficientHistory { available } => {
                write!(f, "insufficient history: {available} samples")
            }
            ReplicationError::StaleActor {
                actor,
                unsynced_for,
            } => write!(f, "actor {actor} unsynced for {unsynced_for:.3}s"),
            ReplicationError::RoleLocked => write!(f, "session role already chosen"),
            ReplicationError::ChannelClosed => write!(f, "channel closed"),
        }
    }
}

impl std::error::Error for ReplicationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_channel_closure_is_fatal() {
        assert!(ReplicationError::UnknownActor(ActorId(3)).is_recoverable());
        assert!(ReplicationError::MalformedSnapshot(Malformed::Truncated {
            expected: 60,
            actual: 12
        })
        .is_recoverable());
        assert!(!ReplicationError::ChannelClosed.is_recoverable());
    }

    #[test]
    fn display_mentions_actor() {
        let e = ReplicationError::StaleActor {
            actor: ActorId(7),
            unsynced_for: 6.0,
        };
        assert_eq!(e.to_string(), "actor #7 unsynced for 6.000s");
    }

    #[test]
    fn malformed_details_are_distinct() {
        let too_many = ReplicationError::MalformedSnapshot(Malformed::TooManyIds {
            count: 16_001,
            max: 16_000,
        });
        assert_eq!(
            too_many.to_string(),
            "malformed snapshot: 16001 ids in one packet, at most 16000"
        );
        assert_eq!(
            Malformed::TrailingBytes {
                expected: 65,
                actual: 66
            }
            .to_string(),
            "1 trailing bytes after 65"
        );
        assert_eq!(Malformed::UnknownTag(0xff).to_string(), "unknown packet tag 0xff");
    }
}
