//! Paged cursor over one segment.

use crate::error::CoreResult;
use crate::keys::{self, KeyLayout};
use crate::segment::Segment;
use sessiondb_storage::{KvBackend, KvPair, ScanDirection};
use std::collections::VecDeque;
use std::sync::Arc;

/// Reads one segment's key range a page at a time.
///
/// # Design
///
/// - The segment's generation is captured when the cursor is created. Each page
///   is read under the segment's read lock, after checking that the segment is
///   still live and at that generation
/// - After a page, the consumed side of the range is narrowed past the last key
///   returned, so the next page resumes where this one stopped
/// - For the time-ordered layout, the value of each index entry is resolved
///   from the primary namespace under the same lock; entries whose session
///   was merged away in between are skipped
pub(crate) struct SegmentCursor {
    segment: Arc<Segment>,
    generation: u64,
    layout: KeyLayout,
    direction: ScanDirection,
    /// Inclusive lower bound of the unread range.
    lower: Vec<u8>,
    /// Exclusive upper bound of the unread range.
    upper: Vec<u8>,
    buffer: VecDeque<KvPair>,
    exhausted: bool,
}

impl SegmentCursor {
    pub(crate) fn new(
        segment: Arc<Segment>,
        layout: KeyLayout,
        direction: ScanDirection,
        lower: Vec<u8>,
        upper: Vec<u8>,
    ) -> Self {
        let exhausted = lower >= upper;
        Self {
            generation: segment.generation(),
            segment,
            layout,
            direction,
            lower,
            upper,
            buffer: VecDeque::new(),
            exhausted,
        }
    }

    pub(crate) fn segment(&self) -> &Arc<Segment> {
        &self.segment
    }

    /// Returns true while the segment is live and has not been rewritten.
    pub(crate) fn is_current(&self) -> bool {
        self.segment.is_unchanged_since(self.generation)
    }

    /// Returns the next pair, reading a page when the buffer runs dry.
    pub(crate) fn next_pair(
        &mut self,
        backend: &dyn KvBackend,
        page_size: usize,
    ) -> CoreResult<Option<KvPair>> {
        while self.buffer.is_empty() && !self.exhausted {
            self.fill(backend, page_size)?;
        }
        Ok(self.buffer.pop_front())
    }

    fn fill(&mut self, backend: &dyn KvBackend, page_size: usize) -> CoreResult<()> {
        let _live = self.segment.read_unchanged(self.generation)?;
        let page = backend.scan(&self.lower, &self.upper, self.direction, page_size)?;

        if page.len() < page_size {
            self.exhausted = true;
        }
        if let Some((last, _)) = page.last() {
            match self.direction {
                ScanDirection::Forward => {
                    let mut next = last.clone();
                    next.push(0);
                    self.lower = next;
                }
                ScanDirection::Backward => self.upper = last.clone(),
            }
            if self.lower >= self.upper {
                self.exhausted = true;
            }
        }

        match self.layout {
            KeyLayout::KeyFirst => self.buffer.extend(page),
            KeyLayout::TimeFirst => {
                for (index_key, _) in page {
                    let decoded = keys::decode(KeyLayout::TimeFirst, &index_key)?;
                    let primary = keys::session_key(decoded.segment, &decoded.key, decoded.window);
                    if let Some(value) = backend.get(&primary)? {
                        self.buffer.push_back((index_key, value));
                    }
                }
            }
        }
        Ok(())
    }
}
