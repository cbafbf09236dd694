//! Per-actor snapshot history.
//!
//! The host sends discrete samples at irregular intervals; the observer keeps
//! the last few per actor, newest first, for reconstruction.

use std::collections::VecDeque;

use crate::state::Snapshot;

/// Most-recent-first ring of snapshots with strictly decreasing timestamps.
#[derive(Debug, Clone)]
pub struct History {
    samples: VecDeque<Snapshot>,
    max: usize,
}

impl History {
    pub fn new(max: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max),
            max: max.max(1),
        }
    }

    /// Inserts `snap` as the newest sample.
    ///
    /// Returns false (and stores nothing) when `snap` is not strictly newer
    /// than the current newest sample: a duplicate or reordered datagram.
    /// Non-finite timestamps are refused outright.
    pub fn push(&mut self, snap: Snapshot) -> bool {
        if !snap.timestamp.is_finite() {
            return false;
        }
        if let Some(newest) = self.samples.front() {
            if snap.timestamp <= newest.timestamp {
                return false;
            }
        }
        self.samples.push_front(snap);
        self.samples.truncate(self.max);
        true
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.samples.front()
    }

    /// Sample `i` back from the newest (0 = newest).
    pub fn get(&self, i: usize) -> Option<&Snapshot> {
        self.samples.get(i)
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.samples.iter()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
