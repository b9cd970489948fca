//! Cross-segment session iteration.
//!
//! A query opens one [`SegmentCursor`] per live segment it touches and merges
//! them with a binary heap keyed by the physical key minus its segment prefix.
//! That key sorts as `(key, end, start)` in the primary layout and as
//! `(end, key, start)` in the time-ordered layout, so popping the heap yields
//! the same sequence a single sorted scan over all segments would.
//!
//! ## Isolation
//!
//! Iterators are invalidated, not snapshotted. Before every advance the
//! iterator checks that each segment it has not finished reading is still
//! live and has not been rewritten since the iterator was opened. A segment
//! is rewritten by a put that replaces sessions, since such a put deletes and
//! writes several rows in one commit. If retention dropped a segment or a
//! put rewrote one, the iterator yields `Err(CoreError::Invalidated { .. })`
//! once and then ends.
//!
//! Puts that only add a session and removes of a single session do not
//! invalidate. Such a row may or may not be observed, depending on whether
//! the cursor had already passed its position. Rows are never repeated and
//! never out of order, and a superseded session is never returned together
//! with the session that replaced it.

mod cursor;

pub(crate) use cursor::SegmentCursor;

use crate::error::{CoreError, CoreResult};
use crate::keys::{self, KeyLayout, SEGMENT_PREFIX_LEN};
use crate::types::Timestamp;
use crate::window::{SessionWindow, Windowed};
use sessiondb_storage::{KvBackend, ScanDirection};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

/// A session and its value, as returned by queries.
pub type SessionEntry = (Windowed<Vec<u8>>, Vec<u8>);

/// Counts open iterators of one store.
#[derive(Debug, Clone, Default)]
pub(crate) struct IteratorTracker {
    open: Arc<AtomicUsize>,
}

impl IteratorTracker {
    pub(crate) fn lease(&self) -> IteratorLease {
        self.open.fetch_add(1, AtomicOrdering::SeqCst);
        IteratorLease {
            open: Arc::clone(&self.open),
        }
    }

    pub(crate) fn open_count(&self) -> usize {
        self.open.load(AtomicOrdering::SeqCst)
    }
}

/// Registration of one open iterator, released on drop.
#[derive(Debug)]
pub(crate) struct IteratorLease {
    open: Arc<AtomicUsize>,
}

impl Drop for IteratorLease {
    fn drop(&mut self) {
        self.open.fetch_sub(1, AtomicOrdering::SeqCst);
    }
}

/// Window predicate applied to every row a cursor produces.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RowFilter {
    /// Retention horizon when the iterator was opened.
    pub horizon: Timestamp,
    pub earliest_end: Timestamp,
    pub latest_start: Timestamp,
    pub latest_end: Timestamp,
}

impl RowFilter {
    fn accepts(&self, window: SessionWindow) -> bool {
        window.end() >= self.horizon
            && window.matches(self.earliest_end, self.latest_start)
            && window.end() <= self.latest_end
    }
}

struct HeapEntry {
    sort_key: Vec<u8>,
    physical_key: Vec<u8>,
    value: Vec<u8>,
    source: usize,
    forward: bool,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        let ord = self
            .sort_key
            .cmp(&other.sort_key)
            .then_with(|| self.source.cmp(&other.source));
        // BinaryHeap pops the greatest entry
        if self.forward {
            ord.reverse()
        } else {
            ord
        }
    }
}

/// Iterator over sessions merged from one or more segments.
///
/// Yields `Ok((windowed_key, value))` in query order, `Err` on backend failure
/// or invalidation, and then `None`. After the first error the iterator is
/// fused.
///
/// The iterator owns its backend and segment handles; it does not borrow the
/// store. Resources are released by [`SessionIterator::close`], on exhaustion,
/// after an error, or on drop.
pub struct SessionIterator {
    backend: Arc<dyn KvBackend>,
    layout: KeyLayout,
    direction: ScanDirection,
    filter: RowFilter,
    page_size: usize,
    cursors: Vec<SegmentCursor>,
    /// Cursors that have no entry in the heap and are not finished.
    pending: Vec<usize>,
    finished: Vec<bool>,
    heap: BinaryHeap<HeapEntry>,
    lease: Option<IteratorLease>,
}

impl SessionIterator {
    pub(crate) fn new(
        backend: Arc<dyn KvBackend>,
        layout: KeyLayout,
        direction: ScanDirection,
        filter: RowFilter,
        page_size: usize,
        cursors: Vec<SegmentCursor>,
        lease: IteratorLease,
    ) -> Self {
        let count = cursors.len();
        Self {
            backend,
            layout,
            direction,
            filter,
            page_size,
            cursors,
            pending: (0..count).collect(),
            finished: vec![false; count],
            heap: BinaryHeap::with_capacity(count),
            lease: Some(lease),
        }
    }

    /// Returns the scan direction.
    #[must_use]
    pub fn direction(&self) -> ScanDirection {
        self.direction
    }

    /// Returns true once the iterator has ended or was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lease.is_none()
    }

    /// Releases the iterator's cursors before it is exhausted.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        self.cursors.clear();
        self.pending.clear();
        self.heap.clear();
        self.lease = None;
    }

    fn fail(&mut self, err: CoreError) -> Option<CoreResult<SessionEntry>> {
        self.release();
        Some(Err(err))
    }

    fn check_liveness(&self) -> CoreResult<()> {
        for (cursor, &done) in self.cursors.iter().zip(&self.finished) {
            if !done && !cursor.is_current() {
                return Err(CoreError::Invalidated {
                    segment_id: cursor.segment().id(),
                });
            }
        }
        Ok(())
    }

    fn refill(&mut self) -> CoreResult<()> {
        let forward = self.direction.is_forward();
        while let Some(source) = self.pending.pop() {
            match self.cursors[source].next_pair(self.backend.as_ref(), self.page_size)? {
                Some((physical_key, value)) => self.heap.push(HeapEntry {
                    sort_key: physical_key[SEGMENT_PREFIX_LEN..].to_vec(),
                    physical_key,
                    value,
                    source,
                    forward,
                }),
                None => self.finished[source] = true,
            }
        }
        Ok(())
    }
}

impl Iterator for SessionIterator {
    type Item = CoreResult<SessionEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_closed() {
            return None;
        }
        loop {
            if let Err(err) = self.check_liveness().and_then(|()| self.refill()) {
                return self.fail(err);
            }

            let Some(entry) = self.heap.pop() else {
                self.release();
                return None;
            };
            self.pending.push(entry.source);

            let decoded = match keys::decode(self.layout, &entry.physical_key) {
                Ok(decoded) => decoded,
                Err(err) => return self.fail(err),
            };
            if self.filter.accepts(decoded.window) {
                let windowed = Windowed::new(decoded.key, decoded.window);
                return Some(Ok((windowed, entry.value)));
            }
        }
    }
}

impl std::fmt::Debug for SessionIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIterator")
            .field("layout", &self.layout)
            .field("direction", &self.direction)
            .field("segments", &self.cursors.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
