//! The segmented session store engine.

use super::{PutOutcome, SessionChange, SessionStore};
use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::iterator::{IteratorTracker, RowFilter, SegmentCursor, SessionIterator};
use crate::keys::{self, KeyLayout};
use crate::manifest::StoreManifest;
use crate::merge::{fold_values, LatestValueMerger, SessionMerger};
use crate::position::{Position, RecordContext};
use crate::segment::SegmentDirectory;
use crate::types::{SegmentId, Timestamp};
use crate::window::{SessionWindow, Windowed};
use sessiondb_storage::{InMemoryBackend, KvBackend, ScanDirection, WriteBatch};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "std")]
use crate::dir::StoreDir;
#[cfg(feature = "std")]
use sessiondb_storage::FileBackend;
#[cfg(feature = "std")]
use std::path::Path;

/// Summary of one live segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSummary {
    /// Segment id.
    pub id: SegmentId,
    /// First timestamp covered.
    pub lower_bound: Timestamp,
    /// Last timestamp covered (inclusive).
    pub upper_bound: Timestamp,
    /// Number of stored sessions, including ones behind the horizon that
    /// have not been dropped with their segment yet.
    pub sessions: usize,
}

/// A session stored in a live segment.
struct StoredSession {
    segment: SegmentId,
    window: SessionWindow,
    value: Vec<u8>,
}

/// Session store backed by time-partitioned segments of one [`KvBackend`].
///
/// # Write path
///
/// A put gathers every live session of the key that overlaps the new window,
/// merges them, and commits one batch with:
///
/// - deletes of the superseded sessions
/// - the merged session, stored in the segment of its window end
/// - markers for newly created segments
/// - the new observed stream time and position
/// - range deletes of segments that fell behind the retention horizon
///
/// In-memory state changes only after the batch is committed, so a failed
/// write leaves the store exactly as it was.
pub struct SegmentedSessionStore {
    config: StoreConfig,
    backend: Arc<dyn KvBackend>,
    directory: SegmentDirectory,
    position: Position,
    merger: Box<dyn SessionMerger>,
    iterators: IteratorTracker,
    #[cfg(feature = "std")]
    _dir: Option<StoreDir>,
}

impl SegmentedSessionStore {
    /// Opens a store over `backend`, recovering any state it already holds.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidArgument`] if the configuration is invalid
    /// - [`CoreError::InvalidFormat`] if the stored manifest is incompatible
    /// - [`CoreError::StorageUnavailable`] if the backend fails
    pub fn open(config: StoreConfig, backend: Arc<dyn KvBackend>) -> CoreResult<Self> {
        config.validate()?;

        let stored = Self::read_manifest(backend.as_ref())?;
        if let Some(manifest) = &stored {
            manifest.check_compatible(&config)?;
        }
        let manifest = StoreManifest::from_config(&config);
        if stored.as_ref() != Some(&manifest) {
            backend.put(keys::META_MANIFEST, &manifest.encode()?)?;
        }

        let mut directory =
            SegmentDirectory::new(config.segment_interval_ms(), config.retention_ms());
        if let Some(bytes) = backend.get(keys::META_STREAM_TIME)? {
            directory.advance_stream_time(keys::decode_u64(&bytes)?);
        }

        let position = match backend.get(keys::META_POSITION)? {
            Some(bytes) => Position::decode(&bytes)?,
            None => Position::new(),
        };

        let marker_end = keys::namespaced_successor(keys::META_SEGMENT_PREFIX);
        let markers = backend.scan(
            keys::META_SEGMENT_PREFIX,
            &marker_end,
            ScanDirection::Forward,
            usize::MAX,
        )?;
        for (marker, _) in markers {
            directory.get_or_create_segment(keys::decode_segment_marker(&marker)?);
        }

        let dropped = directory.expire_segments(backend.as_ref())?;

        tracing::debug!(
            store = %config.name,
            segments = directory.len(),
            stream_time = directory.observed_stream_time(),
            dropped = dropped.len(),
            "opened session store"
        );

        Ok(Self {
            config,
            backend,
            directory,
            position,
            merger: Box::new(LatestValueMerger),
            iterators: IteratorTracker::default(),
            #[cfg(feature = "std")]
            _dir: None,
        })
    }

    /// Opens a store over a fresh in-memory backend.
    pub fn open_in_memory(config: StoreConfig) -> CoreResult<Self> {
        Self::open(config, Arc::new(InMemoryBackend::new()))
    }

    /// Opens a file-backed store in `path`, holding the directory lock for
    /// the lifetime of the store.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreLocked`] if another process has the store
    /// open, plus every error of [`Self::open`].
    #[cfg(feature = "std")]
    pub fn open_path(path: &Path, config: StoreConfig) -> CoreResult<Self> {
        let dir = StoreDir::open(path)?;
        if dir.is_new_store() {
            tracing::info!(path = %path.display(), name = %config.name, "creating store");
        }
        let backend = FileBackend::open_with_options(&dir.log_path(), config.sync_on_write)?;
        let mut store = Self::open(config, Arc::new(backend))?;
        store._dir = Some(dir);
        Ok(store)
    }

    /// Reads the manifest stored in `backend`, if any.
    pub fn read_manifest(backend: &dyn KvBackend) -> CoreResult<Option<StoreManifest>> {
        backend
            .get(keys::META_MANIFEST)?
            .map(|bytes| StoreManifest::decode(&bytes))
            .transpose()
    }

    /// Replaces the value merge policy.
    #[must_use]
    pub fn with_merger(self, merger: impl SessionMerger + 'static) -> Self {
        self.with_boxed_merger(Box::new(merger))
    }

    /// Replaces the value merge policy with an already boxed one.
    #[must_use]
    pub fn with_boxed_merger(mut self, merger: Box<dyn SessionMerger>) -> Self {
        self.merger = merger;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the segment directory.
    #[must_use]
    pub fn directory(&self) -> &SegmentDirectory {
        &self.directory
    }

    /// Returns the backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    /// Returns the retention horizon: the earliest window end still live.
    #[must_use]
    pub fn horizon(&self) -> Timestamp {
        self.directory.horizon()
    }

    /// Returns the number of iterators that have not been released.
    #[must_use]
    pub fn open_iterators(&self) -> usize {
        self.iterators.open_count()
    }

    /// Returns id, span and session count of every live segment.
    pub fn segment_summaries(&self) -> CoreResult<Vec<SegmentSummary>> {
        self.directory
            .segments()
            .map(|segment| {
                let prefix = keys::segment_prefix(KeyLayout::KeyFirst, segment.id());
                let end = keys::namespaced_successor(&prefix);
                let sessions = self
                    .backend
                    .scan(&prefix, &end, ScanDirection::Forward, usize::MAX)?
                    .len();
                Ok(SegmentSummary {
                    id: segment.id(),
                    lower_bound: segment.lower_bound(),
                    upper_bound: segment.upper_bound(),
                    sessions,
                })
            })
            .collect()
    }

    /// Live sessions of `key` overlapping `window`, oldest first.
    fn overlapping_sessions(
        &self,
        key: &[u8],
        window: SessionWindow,
        horizon: Timestamp,
    ) -> CoreResult<Vec<StoredSession>> {
        let iter = self.key_iterator(
            Some(key),
            Some(key),
            window.start(),
            window.end(),
            ScanDirection::Forward,
            horizon,
        )?;
        iter.map(|entry| {
            let (windowed, value) = entry?;
            let window = windowed.window();
            Ok(StoredSession {
                segment: self.directory.segment_id_for(window.end()),
                window,
                value,
            })
        })
        .collect()
    }

    fn key_iterator(
        &self,
        key_from: Option<&[u8]>,
        key_to: Option<&[u8]>,
        earliest_end: Timestamp,
        latest_start: Timestamp,
        direction: ScanDirection,
        horizon: Timestamp,
    ) -> CoreResult<SessionIterator> {
        if let (Some(from), Some(to)) = (key_from, key_to) {
            if from > to {
                return Err(CoreError::invalid_argument(
                    "key range lower bound is greater than its upper bound",
                ));
            }
        }

        let first_end = earliest_end.max(horizon);
        let exact_key = match (key_from, key_to) {
            (Some(from), Some(to)) if from == to => Some(from),
            _ => None,
        };

        let cursors = self
            .directory
            .segments_overlapping(first_end, Timestamp::MAX, direction)
            .into_iter()
            .map(|segment| {
                let id = segment.id();
                let (lower, upper) = if let Some(key) = exact_key {
                    let prefix = keys::key_prefix(id, key);
                    let upper = keys::namespaced_successor(&prefix);
                    let mut lower = prefix;
                    lower.extend_from_slice(&first_end.to_be_bytes());
                    (lower, upper)
                } else {
                    let prefix = keys::segment_prefix(KeyLayout::KeyFirst, id);
                    let lower = key_from.map_or_else(|| prefix.clone(), |k| keys::key_prefix(id, k));
                    let upper = match key_to {
                        Some(k) => keys::namespaced_successor(&keys::key_prefix(id, k)),
                        None => keys::namespaced_successor(&prefix),
                    };
                    (lower, upper)
                };
                SegmentCursor::new(segment, KeyLayout::KeyFirst, direction, lower, upper)
            })
            .collect();

        let filter = RowFilter {
            horizon,
            earliest_end,
            latest_start,
            latest_end: Timestamp::MAX,
        };
        Ok(self.iterator(KeyLayout::KeyFirst, direction, filter, cursors))
    }

    fn iterator(
        &self,
        layout: KeyLayout,
        direction: ScanDirection,
        filter: RowFilter,
        cursors: Vec<SegmentCursor>,
    ) -> SessionIterator {
        SessionIterator::new(
            Arc::clone(&self.backend),
            layout,
            direction,
            filter,
            self.config.scan_batch_size,
            cursors,
            self.iterators.lease(),
        )
    }

    fn queue_delete(&self, batch: &mut WriteBatch, segment: SegmentId, key: &[u8], window: SessionWindow) {
        batch.delete(keys::session_key(segment, key, window));
        if self.config.time_ordered_index {
            batch.delete(keys::time_index_key(segment, key, window));
        }
    }

    fn queue_position(
        &self,
        batch: &mut WriteBatch,
        context: Option<&RecordContext>,
    ) -> CoreResult<Option<Position>> {
        let Some(context) = context else {
            return Ok(None);
        };
        let mut position = self.position.clone();
        position.update_from(context);
        batch.put(keys::META_POSITION, position.encode()?);
        Ok(Some(position))
    }
}

impl SessionStore for SegmentedSessionStore {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn put(
        &mut self,
        session: &Windowed<Vec<u8>>,
        value: &[u8],
        context: Option<&RecordContext>,
    ) -> CoreResult<PutOutcome> {
        let key = session.key().as_slice();
        let window = session.window();
        let previous_time = self.directory.observed_stream_time();
        let stream_time = previous_time.max(window.end());
        let horizon = self.directory.horizon_at(stream_time);

        if window.end() < horizon {
            tracing::warn!(
                store = %self.config.name,
                window = %window,
                horizon,
                "skipping record for expired segment"
            );
            return Ok(PutOutcome::Expired);
        }

        let superseded = self.overlapping_sessions(key, window, horizon)?;
        let merged = superseded
            .iter()
            .fold(window, |acc, stored| acc.merge(&stored.window));
        let merged_value = fold_values(
            self.merger.as_ref(),
            key,
            superseded
                .iter()
                .map(|stored| stored.value.as_slice())
                .chain(std::iter::once(value)),
        )
        .unwrap_or_else(|| value.to_vec());

        let target = self.directory.segment_id_for(merged.end());
        let mut batch = WriteBatch::new();
        let mut changes = Vec::with_capacity(superseded.len() + 1);

        for stored in &superseded {
            if stored.window == merged {
                // overwritten in place by the put below
                continue;
            }
            self.queue_delete(&mut batch, stored.segment, key, stored.window);
            changes.push(SessionChange::tombstone(Windowed::new(
                key.to_vec(),
                stored.window,
            )));
        }

        let creating = !self.directory.contains(target);
        if creating {
            SegmentDirectory::queue_creation(target, &mut batch);
        }
        batch.put(keys::session_key(target, key, merged), merged_value.clone());
        if self.config.time_ordered_index {
            batch.put(keys::time_index_key(target, key, merged), Vec::new());
        }

        if stream_time != previous_time {
            batch.put(keys::META_STREAM_TIME, keys::encode_u64(stream_time));
        }
        let position = self.queue_position(&mut batch, context)?;

        let expiring = self.directory.expired_segments(stream_time);
        SegmentDirectory::queue_expiry(&expiring, &mut batch);

        // replacing sessions touches several rows, so open readers of those
        // segments must not mix rows from before and after the commit
        let rewritten: BTreeSet<SegmentId> = if superseded.is_empty() {
            BTreeSet::new()
        } else {
            superseded
                .iter()
                .map(|stored| stored.segment)
                .chain(std::iter::once(target))
                .collect()
        };
        self.directory
            .commit(self.backend.as_ref(), batch, &rewritten, &expiring)?;

        if creating {
            self.directory.get_or_create_segment(target);
        }
        self.directory.advance_stream_time(stream_time);
        if let Some(position) = position {
            self.position = position;
        }

        if !superseded.is_empty() {
            tracing::trace!(
                store = %self.config.name,
                merged = superseded.len(),
                window = %merged,
                "merged sessions"
            );
        }

        changes.push(SessionChange::put(Windowed::new(key.to_vec(), merged), merged_value));
        Ok(PutOutcome::Applied {
            window: merged,
            changes,
        })
    }

    fn remove(
        &mut self,
        session: &Windowed<Vec<u8>>,
        context: Option<&RecordContext>,
    ) -> CoreResult<Vec<SessionChange>> {
        let key = session.key().as_slice();
        let window = session.window();
        if window.end() < self.directory.horizon() {
            return Ok(Vec::new());
        }
        let segment = self.directory.segment_id_for(window.end());
        if !self.directory.contains(segment) {
            return Ok(Vec::new());
        }
        if self
            .backend
            .get(&keys::session_key(segment, key, window))?
            .is_none()
        {
            return Ok(Vec::new());
        }

        let mut batch = WriteBatch::new();
        self.queue_delete(&mut batch, segment, key, window);
        let position = self.queue_position(&mut batch, context)?;
        self.backend.write(batch)?;

        if let Some(position) = position {
            self.position = position;
        }
        Ok(vec![SessionChange::tombstone(session.clone())])
    }

    fn fetch_session(
        &self,
        key: &[u8],
        start: Timestamp,
        end: Timestamp,
    ) -> CoreResult<Option<Vec<u8>>> {
        let window = SessionWindow::new(start, end)?;
        if end < self.directory.horizon() {
            return Ok(None);
        }
        let segment = self.directory.segment_id_for(end);
        if !self.directory.contains(segment) {
            return Ok(None);
        }
        Ok(self.backend.get(&keys::session_key(segment, key, window))?)
    }

    fn find_sessions(
        &self,
        key: &[u8],
        earliest_end: Timestamp,
        latest_start: Timestamp,
    ) -> CoreResult<SessionIterator> {
        self.key_iterator(
            Some(key),
            Some(key),
            earliest_end,
            latest_start,
            ScanDirection::Forward,
            self.horizon(),
        )
    }

    fn backward_find_sessions(
        &self,
        key: &[u8],
        earliest_end: Timestamp,
        latest_start: Timestamp,
    ) -> CoreResult<SessionIterator> {
        self.key_iterator(
            Some(key),
            Some(key),
            earliest_end,
            latest_start,
            ScanDirection::Backward,
            self.horizon(),
        )
    }

    fn find_session_range(
        &self,
        key_from: Option<&[u8]>,
        key_to: Option<&[u8]>,
        earliest_end: Timestamp,
        latest_start: Timestamp,
    ) -> CoreResult<SessionIterator> {
        self.key_iterator(
            key_from,
            key_to,
            earliest_end,
            latest_start,
            ScanDirection::Forward,
            self.horizon(),
        )
    }

    fn backward_find_session_range(
        &self,
        key_from: Option<&[u8]>,
        key_to: Option<&[u8]>,
        earliest_end: Timestamp,
        latest_start: Timestamp,
    ) -> CoreResult<SessionIterator> {
        self.key_iterator(
            key_from,
            key_to,
            earliest_end,
            latest_start,
            ScanDirection::Backward,
            self.horizon(),
        )
    }

    fn find_sessions_by_end_time(
        &self,
        earliest_end: Timestamp,
        latest_end: Timestamp,
    ) -> CoreResult<SessionIterator> {
        if !self.config.time_ordered_index {
            return Err(CoreError::unsupported(
                "find_sessions_by_end_time requires time_ordered_index",
            ));
        }

        let horizon = self.horizon();
        let first_end = earliest_end.max(horizon);
        let cursors = self
            .directory
            .segments_overlapping(first_end, latest_end, ScanDirection::Forward)
            .into_iter()
            .map(|segment| {
                let prefix = keys::segment_prefix(KeyLayout::TimeFirst, segment.id());
                let mut lower = prefix.clone();
                lower.extend_from_slice(&first_end.to_be_bytes());
                let mut last = prefix;
                last.extend_from_slice(&latest_end.to_be_bytes());
                let upper = keys::namespaced_successor(&last);
                SegmentCursor::new(segment, KeyLayout::TimeFirst, ScanDirection::Forward, lower, upper)
            })
            .collect();

        let filter = RowFilter {
            horizon,
            earliest_end,
            latest_start: Timestamp::MAX,
            latest_end,
        };
        Ok(self.iterator(
            KeyLayout::TimeFirst,
            ScanDirection::Forward,
            filter,
            cursors,
        ))
    }

    fn position(&self) -> Position {
        self.position.clone()
    }

    fn observed_stream_time(&self) -> Timestamp {
        self.directory.observed_stream_time()
    }

    fn flush(&mut self) -> CoreResult<()> {
        self.backend.flush()?;
        Ok(())
    }
}

impl fmt::Debug for SegmentedSessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentedSessionStore")
            .field("name", &self.config.name)
            .field("segments", &self.directory.len())
            .field("stream_time", &self.directory.observed_stream_time())
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}
