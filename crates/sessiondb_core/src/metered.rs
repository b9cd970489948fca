//! Store wrapper that records operation counters.

use crate::error::CoreResult;
use crate::iterator::SessionIterator;
use crate::position::{Position, RecordContext};
use crate::stats::StoreStats;
use crate::store::{PutOutcome, SessionChange, SessionStore};
use crate::types::Timestamp;
use crate::window::Windowed;
use std::sync::Arc;

/// Forwards every operation and counts it in a shared [`StoreStats`].
pub struct MeteredSessionStore<S> {
    inner: S,
    stats: Arc<StoreStats>,
}

impl<S: SessionStore> MeteredSessionStore<S> {
    /// Wraps `inner`, counting into `stats`.
    pub fn new(inner: S, stats: Arc<StoreStats>) -> Self {
        Self { inner, stats }
    }

    /// Returns the counters.
    pub fn stats(&self) -> &Arc<StoreStats> {
        &self.stats
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Unwraps the store.
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn observe<T>(&self, result: CoreResult<T>) -> CoreResult<T> {
        if result.is_err() {
            self.stats.record_error();
        }
        result
    }

    fn query(&self, result: CoreResult<SessionIterator>) -> CoreResult<SessionIterator> {
        self.stats.record_range_query();
        self.observe(result)
    }
}

impl<S: SessionStore> SessionStore for MeteredSessionStore<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn put(
        &mut self,
        session: &Windowed<Vec<u8>>,
        value: &[u8],
        context: Option<&RecordContext>,
    ) -> CoreResult<PutOutcome> {
        let bytes = (session.key().len() + value.len()) as u64;
        self.stats.record_put(bytes);
        let result = self.inner.put(session, value, context);
        let outcome = self.observe(result)?;
        match &outcome {
            PutOutcome::Expired => self.stats.record_expired_drop(),
            PutOutcome::Applied { changes, .. } => {
                let superseded = changes.iter().filter(|c| c.is_tombstone()).count();
                self.stats.record_merges(superseded as u64);
            }
        }
        Ok(outcome)
    }

    fn remove(
        &mut self,
        session: &Windowed<Vec<u8>>,
        context: Option<&RecordContext>,
    ) -> CoreResult<Vec<SessionChange>> {
        self.stats.record_remove();
        let result = self.inner.remove(session, context);
        self.observe(result)
    }

    fn fetch_session(
        &self,
        key: &[u8],
        start: Timestamp,
        end: Timestamp,
    ) -> CoreResult<Option<Vec<u8>>> {
        let value = self.observe(self.inner.fetch_session(key, start, end))?;
        let bytes = value.as_ref().map_or(0, Vec::len) as u64;
        self.stats.record_fetch(bytes);
        Ok(value)
    }

    fn find_sessions(
        &self,
        key: &[u8],
        earliest_end: Timestamp,
        latest_start: Timestamp,
    ) -> CoreResult<SessionIterator> {
        self.query(self.inner.find_sessions(key, earliest_end, latest_start))
    }

    fn backward_find_sessions(
        &self,
        key: &[u8],
        earliest_end: Timestamp,
        latest_start: Timestamp,
    ) -> CoreResult<SessionIterator> {
        self.query(self.inner.backward_find_sessions(key, earliest_end, latest_start))
    }

    fn find_session_range(
        &self,
        key_from: Option<&[u8]>,
        key_to: Option<&[u8]>,
        earliest_end: Timestamp,
        latest_start: Timestamp,
    ) -> CoreResult<SessionIterator> {
        self.query(
            self.inner
                .find_session_range(key_from, key_to, earliest_end, latest_start),
        )
    }

    fn backward_find_session_range(
        &self,
        key_from: Option<&[u8]>,
        key_to: Option<&[u8]>,
        earliest_end: Timestamp,
        latest_start: Timestamp,
    ) -> CoreResult<SessionIterator> {
        self.query(
            self.inner
                .backward_find_session_range(key_from, key_to, earliest_end, latest_start),
        )
    }

    fn find_sessions_by_end_time(
        &self,
        earliest_end: Timestamp,
        latest_end: Timestamp,
    ) -> CoreResult<SessionIterator> {
        self.query(self.inner.find_sessions_by_end_time(earliest_end, latest_end))
    }

    fn position(&self) -> Position {
        self.inner.position()
    }

    fn observed_stream_time(&self) -> Timestamp {
        self.inner.observed_stream_time()
    }

    fn flush(&mut self) -> CoreResult<()> {
        let result = self.inner.flush();
        self.observe(result)
    }
}
