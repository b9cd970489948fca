//! The session store capability and its implementations.
//!
//! [`SessionStore`] is implemented by the raw engine
//! ([`SegmentedSessionStore`]) and by every wrapper. Wrappers own the store
//! they delegate to, so a stack such as metrics over change-logging over the
//! engine is plain composition:
//!
//! ```rust,ignore
//! let store = SessionStoreBuilder::new(config)
//!     .with_change_log(feed)
//!     .with_metrics(stats)
//!     .build()?;
//! ```

mod builder;
mod engine;

pub use builder::SessionStoreBuilder;
pub use engine::{SegmentSummary, SegmentedSessionStore};

use crate::error::CoreResult;
use crate::iterator::SessionIterator;
use crate::position::{Position, RecordContext};
use crate::types::Timestamp;
use crate::window::{SessionWindow, Windowed};

/// One session-level change committed by a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionChange {
    /// Key and window of the affected session.
    pub session: Windowed<Vec<u8>>,
    /// New value, or `None` if the session was deleted.
    pub value: Option<Vec<u8>>,
}

impl SessionChange {
    /// A session that was written.
    #[must_use]
    pub fn put(session: Windowed<Vec<u8>>, value: Vec<u8>) -> Self {
        Self {
            session,
            value: Some(value),
        }
    }

    /// A session that was deleted.
    #[must_use]
    pub fn tombstone(session: Windowed<Vec<u8>>) -> Self {
        Self {
            session,
            value: None,
        }
    }

    /// Returns true for a deletion.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

/// Result of a put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// The write was committed.
    Applied {
        /// Window of the stored session after merging.
        window: SessionWindow,
        /// Sessions deleted by the merge, followed by the stored session.
        changes: Vec<SessionChange>,
    },
    /// The window ended before the retention horizon; nothing was written.
    Expired,
}

impl PutOutcome {
    /// Returns true if the write was committed.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// Returns true if the write was dropped as expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired)
    }

    /// Returns the stored window, if the write was committed.
    #[must_use]
    pub fn window(&self) -> Option<SessionWindow> {
        match self {
            Self::Applied { window, .. } => Some(*window),
            Self::Expired => None,
        }
    }

    /// Returns the committed changes.
    #[must_use]
    pub fn changes(&self) -> &[SessionChange] {
        match self {
            Self::Applied { changes, .. } => changes,
            Self::Expired => &[],
        }
    }
}

/// A time-windowed session store.
///
/// Time arguments are event-time milliseconds. Queries match sessions with
/// `end >= earliest_end` and `start <= latest_start`; rows behind the
/// retention horizon are never returned. Key bounds are inclusive and `None`
/// means unbounded.
///
/// Implementations are single-writer: mutating calls take `&mut self`.
/// Iterators own what they read and may outlive the borrow that created them.
pub trait SessionStore: Send {
    /// Returns the store name.
    fn name(&self) -> &str;

    /// Writes a session, merging it with every live session of the same key
    /// that overlaps or touches its window.
    ///
    /// When `context` is given, the position is advanced in the same atomic
    /// write.
    fn put(
        &mut self,
        session: &Windowed<Vec<u8>>,
        value: &[u8],
        context: Option<&RecordContext>,
    ) -> CoreResult<PutOutcome>;

    /// Deletes exactly this session if it is stored.
    ///
    /// Returns the committed changes, empty when nothing was deleted.
    fn remove(
        &mut self,
        session: &Windowed<Vec<u8>>,
        context: Option<&RecordContext>,
    ) -> CoreResult<Vec<SessionChange>>;

    /// Returns the value of the session with exactly this window.
    fn fetch_session(
        &self,
        key: &[u8],
        start: Timestamp,
        end: Timestamp,
    ) -> CoreResult<Option<Vec<u8>>>;

    /// Returns sessions of `key`, oldest first.
    fn find_sessions(
        &self,
        key: &[u8],
        earliest_end: Timestamp,
        latest_start: Timestamp,
    ) -> CoreResult<SessionIterator>;

    /// Returns sessions of `key`, newest first.
    fn backward_find_sessions(
        &self,
        key: &[u8],
        earliest_end: Timestamp,
        latest_start: Timestamp,
    ) -> CoreResult<SessionIterator>;

    /// Returns sessions of keys in `[key_from, key_to]`, ordered by key and
    /// then by window.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::InvalidArgument`] if `key_from > key_to`.
    fn find_session_range(
        &self,
        key_from: Option<&[u8]>,
        key_to: Option<&[u8]>,
        earliest_end: Timestamp,
        latest_start: Timestamp,
    ) -> CoreResult<SessionIterator>;

    /// Reverse of [`Self::find_session_range`].
    fn backward_find_session_range(
        &self,
        key_from: Option<&[u8]>,
        key_to: Option<&[u8]>,
        earliest_end: Timestamp,
        latest_start: Timestamp,
    ) -> CoreResult<SessionIterator>;

    /// Returns sessions of every key with `earliest_end <= end <= latest_end`,
    /// ordered by `(end, key, start)`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Unsupported`] unless the store maintains the
    /// time-ordered index.
    fn find_sessions_by_end_time(
        &self,
        earliest_end: Timestamp,
        latest_end: Timestamp,
    ) -> CoreResult<SessionIterator>;

    /// Returns a snapshot of the committed position.
    fn position(&self) -> Position;

    /// Returns the highest window end ever written.
    fn observed_stream_time(&self) -> Timestamp;

    /// Flushes the backend.
    fn flush(&mut self) -> CoreResult<()>;

    /// Returns every live session of `key`, oldest first.
    fn fetch(&self, key: &[u8]) -> CoreResult<SessionIterator> {
        self.find_sessions(key, 0, Timestamp::MAX)
    }

    /// Returns every live session of `key`, newest first.
    fn backward_fetch(&self, key: &[u8]) -> CoreResult<SessionIterator> {
        self.backward_find_sessions(key, 0, Timestamp::MAX)
    }

    /// Returns every live session of keys in `[key_from, key_to]`.
    fn fetch_range(
        &self,
        key_from: Option<&[u8]>,
        key_to: Option<&[u8]>,
    ) -> CoreResult<SessionIterator> {
        self.find_session_range(key_from, key_to, 0, Timestamp::MAX)
    }

    /// Reverse of [`Self::fetch_range`].
    fn backward_fetch_range(
        &self,
        key_from: Option<&[u8]>,
        key_to: Option<&[u8]>,
    ) -> CoreResult<SessionIterator> {
        self.backward_find_session_range(key_from, key_to, 0, Timestamp::MAX)
    }
}

impl<S: SessionStore + ?Sized> SessionStore for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn put(
        &mut self,
        session: &Windowed<Vec<u8>>,
        value: &[u8],
        context: Option<&RecordContext>,
    ) -> CoreResult<PutOutcome> {
        (**self).put(session, value, context)
    }

    fn remove(
        &mut self,
        session: &Windowed<Vec<u8>>,
        context: Option<&RecordContext>,
    ) -> CoreResult<Vec<SessionChange>> {
        (**self).remove(session, context)
    }

    fn fetch_session(
        &self,
        key: &[u8],
        start: Timestamp,
        end: Timestamp,
    ) -> CoreResult<Option<Vec<u8>>> {
        (**self).fetch_session(key, start, end)
    }

    fn find_sessions(
        &self,
        key: &[u8],
        earliest_end: Timestamp,
        latest_start: Timestamp,
    ) -> CoreResult<SessionIterator> {
        (**self).find_sessions(key, earliest_end, latest_start)
    }

    fn backward_find_sessions(
        &self,
        key: &[u8],
        earliest_end: Timestamp,
        latest_start: Timestamp,
    ) -> CoreResult<SessionIterator> {
        (**self).backward_find_sessions(key, earliest_end, latest_start)
    }

    fn find_session_range(
        &self,
        key_from: Option<&[u8]>,
        key_to: Option<&[u8]>,
        earliest_end: Timestamp,
        latest_start: Timestamp,
    ) -> CoreResult<SessionIterator> {
        (**self).find_session_range(key_from, key_to, earliest_end, latest_start)
    }

    fn backward_find_session_range(
        &self,
        key_from: Option<&[u8]>,
        key_to: Option<&[u8]>,
        earliest_end: Timestamp,
        latest_start: Timestamp,
    ) -> CoreResult<SessionIterator> {
        (**self).backward_find_session_range(key_from, key_to, earliest_end, latest_start)
    }

    fn find_sessions_by_end_time(
        &self,
        earliest_end: Timestamp,
        latest_end: Timestamp,
    ) -> CoreResult<SessionIterator> {
        (**self).find_sessions_by_end_time(earliest_end, latest_end)
    }

    fn position(&self) -> Position {
        (**self).position()
    }

    fn observed_stream_time(&self) -> Timestamp {
        (**self).observed_stream_time()
    }

    fn flush(&mut self) -> CoreResult<()> {
        (**self).flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_outcome_accessors() {
        let window = SessionWindow::new(1, 4).unwrap();
        let change = SessionChange::put(Windowed::new(b"k".to_vec(), window), b"v".to_vec());
        let applied = PutOutcome::Applied {
            window,
            changes: vec![change.clone()],
        };
        assert!(applied.is_applied());
        assert_eq!(applied.window(), Some(window));
        assert_eq!(applied.changes(), &[change]);

        assert!(PutOutcome::Expired.is_expired());
        assert!(PutOutcome::Expired.changes().is_empty());
    }

    #[test]
    fn tombstone_has_no_value() {
        let change = SessionChange::tombstone(Windowed::new(b"k".to_vec(), SessionWindow::at(0)));
        assert!(change.is_tombstone());
    }
}
