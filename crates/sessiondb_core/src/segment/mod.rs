//! Segments of the session keyspace.
//!
//! A segment owns every session whose window ends inside a fixed span of event
//! time. Its records occupy one contiguous range in each data namespace of the
//! backend, so dropping a segment is a pair of range deletes regardless of how
//! many sessions it holds.
//!
//! ## Lifecycle
//!
//! ```text
//! (absent) --first write--> Live --expiry--> Dropped
//! ```
//!
//! A segment is created lazily by the first write that lands in it. It is
//! dropped once its upper bound falls behind the retention horizon. Readers
//! hold the segment's read lock while they page through it; expiry holds the
//! write lock while the delete is committed, so a reader sees either the whole
//! segment or a `Dropped` state, never a half-deleted range.
//!
//! Writes that replace sessions (merges and in-place overwrites) also commit
//! under the write lock of every segment they touch and bump its generation.
//! A reader that opened at an older generation refuses to read further pages.

mod directory;

pub use directory::SegmentDirectory;

use crate::error::{CoreError, CoreResult};
use crate::types::{SegmentId, Timestamp};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle state of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// The segment's records are readable.
    Live,
    /// The segment was removed by retention.
    Dropped,
}

/// Handle to one segment.
///
/// Handles are shared between the directory and open iterators through `Arc`.
pub struct Segment {
    id: SegmentId,
    lower_bound: Timestamp,
    upper_bound: Timestamp,
    state: RwLock<SegmentState>,
    /// Count of committed writes that replaced sessions in this segment.
    generation: AtomicU64,
}

impl Segment {
    pub(crate) fn new(id: SegmentId, interval: u64) -> Self {
        Self {
            id,
            lower_bound: id.lower_bound(interval),
            upper_bound: id.upper_bound(interval),
            state: RwLock::new(SegmentState::Live),
            generation: AtomicU64::new(0),
        }
    }

    /// Returns the segment id.
    #[must_use]
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Returns the first timestamp covered.
    #[must_use]
    pub fn lower_bound(&self) -> Timestamp {
        self.lower_bound
    }

    /// Returns the last timestamp covered (inclusive).
    #[must_use]
    pub fn upper_bound(&self) -> Timestamp {
        self.upper_bound
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SegmentState {
        *self.state.read()
    }

    /// Returns true while the segment has not been dropped.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state() == SegmentState::Live
    }

    /// Returns the rewrite generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Returns true if the segment is live and still at `generation`.
    pub(crate) fn is_unchanged_since(&self, generation: u64) -> bool {
        self.is_live() && self.generation() == generation
    }

    /// Acquires the read lock, failing if the segment was dropped or rewritten
    /// after `generation`.
    pub(crate) fn read_unchanged(
        &self,
        generation: u64,
    ) -> CoreResult<RwLockReadGuard<'_, SegmentState>> {
        let guard = self.state.read();
        if *guard == SegmentState::Dropped || self.generation() != generation {
            return Err(CoreError::Invalidated {
                segment_id: self.id,
            });
        }
        Ok(guard)
    }

    /// Acquires the write lock for expiry or a rewrite.
    pub(crate) fn lock_exclusive(&self) -> RwLockWriteGuard<'_, SegmentState> {
        self.state.write()
    }

    /// Records a committed rewrite. Callers hold [`Self::lock_exclusive`].
    pub(crate) fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("id", &self.id)
            .field("span", &(self.lower_bound..=self.upper_bound))
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_segment_is_live() {
        let segment = Segment::new(SegmentId::new(2), 100);
        assert!(segment.is_live());
        assert_eq!(segment.lower_bound(), 200);
        assert_eq!(segment.upper_bound(), 299);
        assert_eq!(segment.generation(), 0);
        assert!(segment.read_unchanged(0).is_ok());
    }

    #[test]
    fn dropped_segment_rejects_readers() {
        let segment = Segment::new(SegmentId::new(5), 100);
        *segment.lock_exclusive() = SegmentState::Dropped;

        assert!(!segment.is_live());
        let err = segment.read_unchanged(0).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Invalidated { segment_id } if segment_id == SegmentId::new(5)
        ));
    }

    #[test]
    fn rewrite_rejects_readers_of_older_generation() {
        let segment = Segment::new(SegmentId::new(1), 100);
        {
            let _guard = segment.lock_exclusive();
            segment.bump_generation();
        }

        assert!(segment.is_live());
        assert!(!segment.is_unchanged_since(0));
        assert!(segment.read_unchanged(0).unwrap_err().is_invalidated());
        assert!(segment.read_unchanged(1).is_ok());
    }
}
