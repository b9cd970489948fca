//! Segment directory: maps event time to segments and applies retention.

use super::{Segment, SegmentState};
use crate::error::CoreResult;
use crate::keys::{self, KeyLayout};
use crate::types::{SegmentId, Timestamp};
use sessiondb_storage::{KvBackend, ScanDirection, WriteBatch};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Tracks live segments and the observed stream time.
///
/// ## Retention
///
/// With observed stream time `T` and retention `R`, the retention horizon is
/// `T - R + 1` (zero while `T < R`). A record is live iff its window end is at
/// or after the horizon; a segment is expired iff its upper bound is before it.
///
/// Structural changes are two-phase: the caller queues segment markers and
/// expiry deletes into the batch of the write that triggers them, and only
/// after that batch is committed does the directory update its map.
#[derive(Debug)]
pub struct SegmentDirectory {
    interval: u64,
    retention: u64,
    observed_stream_time: Timestamp,
    segments: BTreeMap<SegmentId, Arc<Segment>>,
}

impl SegmentDirectory {
    /// Creates an empty directory.
    ///
    /// `interval` and `retention` are in milliseconds and must be positive.
    #[must_use]
    pub fn new(interval: u64, retention: u64) -> Self {
        Self {
            interval,
            retention,
            observed_stream_time: 0,
            segments: BTreeMap::new(),
        }
    }

    /// Returns the segment interval in milliseconds.
    #[must_use]
    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Returns the retention period in milliseconds.
    #[must_use]
    pub fn retention(&self) -> u64 {
        self.retention
    }

    /// Returns the highest window end ever written.
    #[must_use]
    pub fn observed_stream_time(&self) -> Timestamp {
        self.observed_stream_time
    }

    /// Returns the id of the segment owning `timestamp`.
    #[must_use]
    pub fn segment_id_for(&self, timestamp: Timestamp) -> SegmentId {
        SegmentId::for_timestamp(timestamp, self.interval)
    }

    /// Returns the retention horizon for the current stream time.
    #[must_use]
    pub fn horizon(&self) -> Timestamp {
        self.horizon_at(self.observed_stream_time)
    }

    /// Returns the retention horizon for stream time `observed`.
    #[must_use]
    pub fn horizon_at(&self, observed: Timestamp) -> Timestamp {
        observed
            .checked_sub(self.retention)
            .map_or(0, |behind| behind + 1)
    }

    /// Returns true if the segment exists and is live.
    #[must_use]
    pub fn contains(&self, id: SegmentId) -> bool {
        self.segments.contains_key(&id)
    }

    /// Returns the segment with `id`.
    #[must_use]
    pub fn get(&self, id: SegmentId) -> Option<Arc<Segment>> {
        self.segments.get(&id).cloned()
    }

    /// Returns the segment with `id`, registering it if absent.
    ///
    /// Registration is in memory only; persisting the segment marker is the
    /// job of [`Self::queue_creation`].
    pub fn get_or_create_segment(&mut self, id: SegmentId) -> Arc<Segment> {
        let interval = self.interval;
        Arc::clone(self.segments.entry(id).or_insert_with(|| {
            tracing::debug!(segment = %id, "created segment");
            Arc::new(Segment::new(id, interval))
        }))
    }

    /// Returns live segments whose span intersects `[from, to]`, ordered by
    /// time in `direction`.
    #[must_use]
    pub fn segments_overlapping(
        &self,
        from: Timestamp,
        to: Timestamp,
        direction: ScanDirection,
    ) -> Vec<Arc<Segment>> {
        if from > to {
            return Vec::new();
        }
        let range = self
            .segments
            .range(self.segment_id_for(from)..=self.segment_id_for(to))
            .map(|(_, segment)| Arc::clone(segment));
        match direction {
            ScanDirection::Forward => range.collect(),
            ScanDirection::Backward => range.rev().collect(),
        }
    }

    /// Returns every live segment in ascending order.
    pub fn segments(&self) -> impl Iterator<Item = &Arc<Segment>> {
        self.segments.values()
    }

    /// Returns the number of live segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns true if no segment is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the segments that are expired at stream time `observed`.
    #[must_use]
    pub fn expired_segments(&self, observed: Timestamp) -> Vec<Arc<Segment>> {
        let horizon = self.horizon_at(observed);
        self.segments
            .values()
            .take_while(|segment| segment.upper_bound() < horizon)
            .cloned()
            .collect()
    }

    /// Queues the marker recording that segment `id` exists.
    pub(crate) fn queue_creation(id: SegmentId, batch: &mut WriteBatch) {
        batch.put(keys::segment_marker_key(id), Vec::new());
    }

    /// Queues the bulk delete of `segments`.
    pub(crate) fn queue_expiry(segments: &[Arc<Segment>], batch: &mut WriteBatch) {
        for segment in segments {
            for layout in [KeyLayout::KeyFirst, KeyLayout::TimeFirst] {
                let prefix = keys::segment_prefix(layout, segment.id());
                let end = keys::namespaced_successor(&prefix);
                batch.delete_range(prefix, end);
            }
            batch.delete(keys::segment_marker_key(segment.id()));
        }
    }

    /// Commits `batch` while holding the write lock of every segment in
    /// `rewritten` and `expiring`. After the write, rewritten segments move to
    /// a new generation and expiring ones are marked dropped and forgotten.
    ///
    /// `rewritten` may name segments that do not exist yet; no reader can hold
    /// those. On failure nothing changes.
    pub(crate) fn commit(
        &mut self,
        backend: &dyn KvBackend,
        batch: WriteBatch,
        rewritten: &BTreeSet<SegmentId>,
        expiring: &[Arc<Segment>],
    ) -> CoreResult<()> {
        let rewriting: Vec<Arc<Segment>> = rewritten
            .iter()
            .filter_map(|id| self.segments.get(id).cloned())
            .collect();
        {
            let _rewrite_guards: Vec<_> = rewriting.iter().map(|s| s.lock_exclusive()).collect();
            let mut drop_guards: Vec<_> = expiring.iter().map(|s| s.lock_exclusive()).collect();
            backend.write(batch)?;
            for segment in &rewriting {
                segment.bump_generation();
            }
            for guard in &mut drop_guards {
                **guard = SegmentState::Dropped;
            }
        }
        for segment in expiring {
            self.segments.remove(&segment.id());
            tracing::debug!(segment = %segment.id(), "dropped expired segment");
        }
        Ok(())
    }

    /// Moves the observed stream time forward to `timestamp`.
    ///
    /// Never moves it backward.
    pub(crate) fn advance_stream_time(&mut self, timestamp: Timestamp) {
        self.observed_stream_time = self.observed_stream_time.max(timestamp);
    }

    /// Drops every segment expired at the current stream time as one batch.
    ///
    /// Returns the ids of the dropped segments.
    pub fn expire_segments(&mut self, backend: &dyn KvBackend) -> CoreResult<Vec<SegmentId>> {
        let expiring = self.expired_segments(self.observed_stream_time);
        if expiring.is_empty() {
            return Ok(Vec::new());
        }
        let mut batch = WriteBatch::new();
        Self::queue_expiry(&expiring, &mut batch);
        self.commit(backend, batch, &BTreeSet::new(), &expiring)?;
        Ok(expiring.iter().map(|s| s.id()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sessiondb_storage::InMemoryBackend;

    fn directory() -> SegmentDirectory {
        SegmentDirectory::new(100, 250)
    }

    #[test]
    fn horizon_is_zero_before_retention_elapses() {
        let dir = directory();
        assert_eq!(dir.horizon_at(0), 0);
        assert_eq!(dir.horizon_at(249), 0);
        assert_eq!(dir.horizon_at(250), 1);
        assert_eq!(dir.horizon_at(1000), 751);
    }

    #[test]
    fn segments_overlapping_respects_direction() {
        let mut dir = directory();
        for id in [0, 1, 2, 5] {
            dir.get_or_create_segment(SegmentId::new(id));
        }

        let forward: Vec<_> = dir
            .segments_overlapping(150, 520, ScanDirection::Forward)
            .iter()
            .map(|s| s.id().as_u64())
            .collect();
        assert_eq!(forward, vec![1, 2, 5]);

        let backward: Vec<_> = dir
            .segments_overlapping(0, 250, ScanDirection::Backward)
            .iter()
            .map(|s| s.id().as_u64())
            .collect();
        assert_eq!(backward, vec![2, 1, 0]);

        assert!(dir
            .segments_overlapping(300, 100, ScanDirection::Forward)
            .is_empty());
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let mut dir = directory();
        let a = dir.get_or_create_segment(SegmentId::new(3));
        let b = dir.get_or_create_segment(SegmentId::new(3));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn expired_segments_use_upper_bound() {
        let mut dir = directory();
        for id in 0..4 {
            dir.get_or_create_segment(SegmentId::new(id));
        }
        // horizon 200: segment 1 ends at 199, segment 2 at 299
        let expired: Vec<_> = dir
            .expired_segments(449)
            .iter()
            .map(|s| s.id().as_u64())
            .collect();
        assert_eq!(expired, vec![0, 1]);
    }

    #[test]
    fn expire_segments_deletes_ranges_and_marks_dropped() {
        let backend = InMemoryBackend::new();
        let mut dir = directory();

        let mut batch = WriteBatch::new();
        for id in 0..3 {
            let seg = SegmentId::new(id);
            SegmentDirectory::queue_creation(seg, &mut batch);
            let window = crate::window::SessionWindow::at(id * 100);
            batch.put(keys::session_key(seg, b"k", window), b"v".to_vec());
            dir.get_or_create_segment(seg);
        }
        backend.write(batch).unwrap();

        let first = dir.get(SegmentId::new(0)).unwrap();
        dir.advance_stream_time(400);
        let dropped = dir.expire_segments(&backend).unwrap();

        assert_eq!(dropped, vec![SegmentId::new(0)]);
        assert!(!first.is_live());
        assert!(!dir.contains(SegmentId::new(0)));
        assert!(dir.contains(SegmentId::new(1)));
        // one marker and one session remain for each of segments 1 and 2
        assert_eq!(backend.len(), 4);
    }

    #[test]
    fn rewrite_commit_bumps_existing_segments_only() {
        let backend = InMemoryBackend::new();
        let mut dir = directory();
        let first = dir.get_or_create_segment(SegmentId::new(0));
        let other = dir.get_or_create_segment(SegmentId::new(1));

        let rewritten = BTreeSet::from([SegmentId::new(0), SegmentId::new(7)]);
        dir.commit(&backend, WriteBatch::new(), &rewritten, &[]).unwrap();

        assert_eq!(first.generation(), 1);
        assert_eq!(other.generation(), 0);
        assert!(!dir.contains(SegmentId::new(7)));
    }

    #[test]
    fn stream_time_never_moves_backward() {
        let mut dir = directory();
        dir.advance_stream_time(500);
        dir.advance_stream_time(100);
        assert_eq!(dir.observed_stream_time(), 500);
    }
}
