//! Core type definitions for sessiondb.

use std::fmt;

/// Event time in milliseconds.
pub type Timestamp = u64;

/// Identifier of a segment.
///
/// A segment id is `timestamp / segment_interval`, so ids are ordered the same
/// way as the time spans they cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId(pub u64);

impl SegmentId {
    /// Creates a new segment ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the segment owning `timestamp`.
    #[must_use]
    pub const fn for_timestamp(timestamp: Timestamp, interval: u64) -> Self {
        Self(timestamp / interval)
    }

    /// Returns the first timestamp covered by this segment.
    #[must_use]
    pub const fn lower_bound(self, interval: u64) -> Timestamp {
        self.0.saturating_mul(interval)
    }

    /// Returns the last timestamp covered by this segment (inclusive).
    #[must_use]
    pub const fn upper_bound(self, interval: u64) -> Timestamp {
        let next = match self.0.checked_add(1) {
            Some(next) => next.checked_mul(interval),
            None => None,
        };
        match next {
            Some(next) => next - 1,
            None => Timestamp::MAX,
        }
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seg:{}", self.0)
    }
}
