//! Change logging for committed session writes.
//!
//! [`ChangeLoggingSessionStore`] forwards every operation to the store it
//! wraps and, once a write has committed, appends one [`ChangeRecord`] per
//! session it changed. Replaying the records in order against an empty store
//! reproduces the logged store's sessions.
//!
//! Records are appended after the commit. If an append fails the write stays
//! committed and the wrapper returns [`CoreError::ChangeLogFailed`], carrying
//! the committed changes and how many of them are missing from the log.
//!
//! [`ChangeFeed`] is the in-process [`ChangeLog`]: it assigns sequence numbers,
//! fans records out to subscribers and keeps a bounded history for polling.
//!
//! ```rust,ignore
//! let feed = Arc::new(ChangeFeed::new());
//! let receiver = feed.subscribe();
//! let mut store = ChangeLoggingSessionStore::new(engine, Arc::clone(&feed));
//!
//! store.put(&session, b"value", None)?;
//! let event = receiver.recv()?;
//! ```

use crate::error::{CoreError, CoreResult};
use crate::iterator::SessionIterator;
use crate::position::{Position, RecordContext};
use crate::store::{PutOutcome, SessionChange, SessionStore};
use crate::types::Timestamp;
use crate::window::{SessionWindow, Windowed};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// One logged session change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    /// Name of the store that committed the change.
    pub store: String,
    /// Session key.
    pub key: Vec<u8>,
    /// Session window.
    pub window: SessionWindow,
    /// New value, or `None` for a tombstone.
    pub value: Option<Vec<u8>>,
    /// Source record of the write, if known.
    pub context: Option<RecordContext>,
}

impl ChangeRecord {
    /// Builds a record from a committed change.
    #[must_use]
    pub fn from_change(store: &str, change: SessionChange, context: Option<&RecordContext>) -> Self {
        let (key, window) = change.session.into_parts();
        Self {
            store: store.to_string(),
            key,
            window,
            value: change.value,
            context: context.cloned(),
        }
    }

    /// Returns true for a deletion.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

/// Destination of change records.
pub trait ChangeLog: Send + Sync {
    /// Appends a record and returns its sequence number.
    ///
    /// # Errors
    ///
    /// Returns an error if the record could not be appended.
    fn append(&self, record: ChangeRecord) -> CoreResult<u64>;
}

impl<L: ChangeLog + ?Sized> ChangeLog for Arc<L> {
    fn append(&self, record: ChangeRecord) -> CoreResult<u64> {
        (**self).append(record)
    }
}

impl<L: ChangeLog + ?Sized> ChangeLog for Box<L> {
    fn append(&self, record: ChangeRecord) -> CoreResult<u64> {
        (**self).append(record)
    }
}

/// A change record with its position in the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Sequence number, starting at 1.
    pub sequence: u64,
    /// The logged change.
    pub record: ChangeRecord,
}

struct History {
    events: VecDeque<ChangeEvent>,
    last_sequence: u64,
}

/// In-process change log with subscribers and a bounded history.
///
/// - Preserves append order
/// - Supports multiple subscribers
/// - Drops subscribers whose receiver was dropped
/// - Is thread-safe
pub struct ChangeFeed {
    subscribers: RwLock<Vec<Sender<ChangeEvent>>>,
    history: RwLock<History>,
    max_history: usize,
}

impl ChangeFeed {
    /// Creates a feed keeping the last 10 000 events.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_history(10_000)
    }

    /// Creates a feed keeping the last `max_history` events.
    #[must_use]
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(History {
                events: VecDeque::new(),
                last_sequence: 0,
            }),
            max_history,
        }
    }

    /// Returns a receiver for every event appended from now on.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Returns events with `sequence > cursor`, at most `limit` of them.
    #[must_use]
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<ChangeEvent> {
        self.history
            .read()
            .events
            .iter()
            .filter(|event| event.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns the sequence number of the last appended event.
    #[must_use]
    pub fn latest_sequence(&self) -> u64 {
        self.history.read().last_sequence
    }

    /// Returns the number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Returns the number of events kept for polling.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.read().events.len()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeLog for ChangeFeed {
    fn append(&self, record: ChangeRecord) -> CoreResult<u64> {
        let event = {
            let mut history = self.history.write();
            history.last_sequence += 1;
            let event = ChangeEvent {
                sequence: history.last_sequence,
                record,
            };
            history.events.push_back(event.clone());
            while history.events.len() > self.max_history {
                history.events.pop_front();
            }
            event
        };

        let sequence = event.sequence;
        self.subscribers
            .write()
            .retain(|tx| tx.send(event.clone()).is_ok());
        Ok(sequence)
    }
}

/// Store wrapper that logs every committed change.
///
/// # Errors
///
/// `put` and `remove` return [`CoreError::ChangeLogFailed`] when the inner
/// write committed but logging it did not. Callers must treat the write as
/// applied.
pub struct ChangeLoggingSessionStore<S, L> {
    inner: S,
    log: L,
}

impl<S: SessionStore, L: ChangeLog> ChangeLoggingSessionStore<S, L> {
    /// Wraps `inner`, logging to `log`.
    pub fn new(inner: S, log: L) -> Self {
        Self { inner, log }
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns the change log.
    pub fn log(&self) -> &L {
        &self.log
    }

    /// Unwraps the store.
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn log_changes(
        &self,
        changes: &[SessionChange],
        context: Option<&RecordContext>,
    ) -> CoreResult<()> {
        let name = self.inner.name();
        for (logged, change) in changes.iter().enumerate() {
            let record = ChangeRecord::from_change(name, change.clone(), context);
            if let Err(err) = self.log.append(record) {
                let unlogged = changes.len() - logged;
                tracing::error!(
                    store = name,
                    unlogged,
                    error = %err,
                    "change log append failed after commit"
                );
                return Err(CoreError::ChangeLogFailed {
                    committed: changes.to_vec(),
                    unlogged,
                    source: Box::new(err),
                });
            }
        }
        Ok(())
    }
}

impl<S: SessionStore, L: ChangeLog> SessionStore for ChangeLoggingSessionStore<S, L> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn put(
        &mut self,
        session: &Windowed<Vec<u8>>,
        value: &[u8],
        context: Option<&RecordContext>,
    ) -> CoreResult<PutOutcome> {
        let outcome = self.inner.put(session, value, context)?;
        self.log_changes(outcome.changes(), context)?;
        Ok(outcome)
    }

    fn remove(
        &mut self,
        session: &Windowed<Vec<u8>>,
        context: Option<&RecordContext>,
    ) -> CoreResult<Vec<SessionChange>> {
        let changes = self.inner.remove(session, context)?;
        self.log_changes(&changes, context)?;
        Ok(changes)
    }

    fn fetch_session(
        &self,
        key: &[u8],
        start: Timestamp,
        end: Timestamp,
    ) -> CoreResult<Option<Vec<u8>>> {
        self.inner.fetch_session(key, start, end)
    }

    fn find_sessions(
        &self,
        key: &[u8],
        earliest_end: Timestamp,
        latest_start: Timestamp,
    ) -> CoreResult<SessionIterator> {
        self.inner.find_sessions(key, earliest_end, latest_start)
    }

    fn backward_find_sessions(
        &self,
        key: &[u8],
        earliest_end: Timestamp,
        latest_start: Timestamp,
    ) -> CoreResult<SessionIterator> {
        self.inner.backward_find_sessions(key, earliest_end, latest_start)
    }

    fn find_session_range(
        &self,
        key_from: Option<&[u8]>,
        key_to: Option<&[u8]>,
        earliest_end: Timestamp,
        latest_start: Timestamp,
    ) -> CoreResult<SessionIterator> {
        self.inner
            .find_session_range(key_from, key_to, earliest_end, latest_start)
    }

    fn backward_find_session_range(
        &self,
        key_from: Option<&[u8]>,
        key_to: Option<&[u8]>,
        earliest_end: Timestamp,
        latest_start: Timestamp,
    ) -> CoreResult<SessionIterator> {
        self.inner
            .backward_find_session_range(key_from, key_to, earliest_end, latest_start)
    }

    fn find_sessions_by_end_time(
        &self,
        earliest_end: Timestamp,
        latest_end: Timestamp,
    ) -> CoreResult<SessionIterator> {
        self.inner.find_sessions_by_end_time(earliest_end, latest_end)
    }

    fn position(&self) -> Position {
        self.inner.position()
    }

    fn observed_stream_time(&self) -> Timestamp {
        self.inner.observed_stream_time()
    }

    fn flush(&mut self) -> CoreResult<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::store::SegmentedSessionStore;
    use std::thread;
    use std::time::Duration;

    fn record(key: &str, value: Option<&str>) -> ChangeRecord {
        ChangeRecord {
            store: "s".to_string(),
            key: key.as_bytes().to_vec(),
            window: SessionWindow::at(0),
            value: value.map(|v| v.as_bytes().to_vec()),
            context: None,
        }
    }

    fn logged_store() -> (
        ChangeLoggingSessionStore<SegmentedSessionStore, Arc<ChangeFeed>>,
        Arc<ChangeFeed>,
    ) {
        let config = StoreConfig::new("logged", Duration::from_secs(10));
        let engine = SegmentedSessionStore::open_in_memory(config).unwrap();
        let feed = Arc::new(ChangeFeed::new());
        (
            ChangeLoggingSessionStore::new(engine, Arc::clone(&feed)),
            feed,
        )
    }

    fn session(key: &str, start: u64, end: u64) -> Windowed<Vec<u8>> {
        Windowed::new(key.as_bytes().to_vec(), SessionWindow::new(start, end).unwrap())
    }

    /// Accepts `capacity` records, then fails every append.
    struct FullLog {
        feed: ChangeFeed,
        capacity: u64,
    }

    impl ChangeLog for FullLog {
        fn append(&self, record: ChangeRecord) -> CoreResult<u64> {
            if self.feed.latest_sequence() >= self.capacity {
                return Err(CoreError::invalid_argument("change log full"));
            }
            self.feed.append(record)
        }
    }

    #[test]
    fn append_assigns_sequences() {
        let feed = ChangeFeed::new();
        assert_eq!(feed.latest_sequence(), 0);
        assert_eq!(feed.append(record("a", Some("1"))).unwrap(), 1);
        assert_eq!(feed.append(record("b", None)).unwrap(), 2);
        assert_eq!(feed.latest_sequence(), 2);
    }

    #[test]
    fn multiple_subscribers() {
        let feed = ChangeFeed::new();
        let rx1 = feed.subscribe();
        let rx2 = feed.subscribe();

        feed.append(record("a", Some("1"))).unwrap();

        assert_eq!(rx1.recv().unwrap().record.key, b"a".to_vec());
        assert_eq!(rx2.recv().unwrap().sequence, 1);
    }

    #[test]
    fn subscriber_cleanup() {
        let feed = ChangeFeed::new();
        let rx = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);

        drop(rx);
        feed.append(record("a", None)).unwrap();
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn poll_and_history_truncation() {
        let feed = ChangeFeed::with_max_history(3);
        for i in 0..5 {
            feed.append(record(&i.to_string(), None)).unwrap();
        }
        assert_eq!(feed.history_len(), 3);

        let events = feed.poll(0, 10);
        assert_eq!(events[0].sequence, 3);
        assert_eq!(feed.poll(3, 1).len(), 1);
        assert_eq!(feed.poll(3, 1)[0].sequence, 4);
    }

    #[test]
    fn threaded_subscribe() {
        let feed = Arc::new(ChangeFeed::new());
        let rx = feed.subscribe();

        let writer = Arc::clone(&feed);
        let handle = thread::spawn(move || {
            writer.append(record("t", Some("42"))).unwrap();
        });

        let event = rx.recv_timeout(Duration::from_millis(500)).unwrap();
        assert_eq!(event.record.value, Some(b"42".to_vec()));
        handle.join().unwrap();
    }

    #[test]
    fn merge_logs_tombstones_then_put() {
        let (mut store, feed) = logged_store();
        store.put(&session("a", 0, 5), b"1", None).unwrap();
        store.put(&session("a", 10, 15), b"2", None).unwrap();
        store
            .put(&session("a", 5, 10), b"3", Some(&RecordContext::new("in", 0, 7)))
            .unwrap();

        let events = feed.poll(2, 10);
        let summary: Vec<_> = events
            .iter()
            .map(|e| (e.record.window.start(), e.record.window.end(), e.record.is_tombstone()))
            .collect();
        assert_eq!(summary, vec![(0, 5, true), (10, 15, true), (0, 15, false)]);
        assert!(events
            .iter()
            .all(|e| e.record.context == Some(RecordContext::new("in", 0, 7))));
        assert_eq!(events[0].record.store, "logged");
    }

    #[test]
    fn expired_and_missing_writes_are_not_logged() {
        let (mut store, feed) = logged_store();
        store.put(&session("a", 0, 50_000), b"1", None).unwrap();
        assert!(store.put(&session("b", 0, 1), b"x", None).unwrap().is_expired());
        assert!(store.remove(&session("c", 0, 1), None).unwrap().is_empty());
        assert_eq!(feed.latest_sequence(), 1);
    }

    #[test]
    fn remove_logs_tombstone() {
        let (mut store, feed) = logged_store();
        store.put(&session("a", 0, 5), b"1", None).unwrap();
        store.remove(&session("a", 0, 5), None).unwrap();

        let last = feed.poll(1, 10);
        assert_eq!(last.len(), 1);
        assert!(last[0].record.is_tombstone());
    }

    #[test]
    fn failed_append_reports_committed_write() {
        let config = StoreConfig::new("logged", Duration::from_secs(10));
        let engine = SegmentedSessionStore::open_in_memory(config).unwrap();
        let log = FullLog {
            feed: ChangeFeed::new(),
            capacity: 3,
        };
        let mut store = ChangeLoggingSessionStore::new(engine, log);
        store.put(&session("a", 0, 5), b"1", None).unwrap();
        store.put(&session("a", 10, 15), b"2", None).unwrap();

        // the merge commits two tombstones and a put; only one more fits
        let err = store.put(&session("a", 5, 10), b"3", None).unwrap_err();
        match &err {
            CoreError::ChangeLogFailed {
                committed,
                unlogged,
                ..
            } => {
                assert_eq!(committed.len(), 3);
                assert_eq!(*unlogged, 2);
            }
            other => panic!("expected change log failure, got {other:?}"),
        }
        assert_eq!(err.committed_changes().map(<[_]>::len), Some(3));
        assert_eq!(
            store.fetch_session(b"a", 0, 15).unwrap(),
            Some(b"3".to_vec())
        );
        assert_eq!(store.log().feed.latest_sequence(), 3);

        let err = store.remove(&session("a", 0, 15), None).unwrap_err();
        assert_eq!(err.committed_changes().map(<[_]>::len), Some(1));
        assert_eq!(store.fetch_session(b"a", 0, 15).unwrap(), None);
    }
}
