//! Session windows and windowed keys.

use crate::error::{CoreError, CoreResult};
use crate::types::Timestamp;
use std::cmp::Ordering;
use std::fmt;

/// A closed interval `[start, end]` of event time covered by one session.
///
/// Windows are immutable. The constructor enforces `start <= end`.
///
/// Windows order by `(end, start)`, which is the order sessions of one key are
/// laid out in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionWindow {
    start: Timestamp,
    end: Timestamp,
}

impl SessionWindow {
    /// Creates a window covering `[start, end]`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if `start > end`.
    pub fn new(start: Timestamp, end: Timestamp) -> CoreResult<Self> {
        if start > end {
            return Err(CoreError::invalid_argument(format!(
                "session window start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Creates a zero-length window at `timestamp`.
    #[must_use]
    pub const fn at(timestamp: Timestamp) -> Self {
        Self {
            start: timestamp,
            end: timestamp,
        }
    }

    /// Returns the first timestamp of the session.
    #[must_use]
    pub const fn start(&self) -> Timestamp {
        self.start
    }

    /// Returns the last timestamp of the session.
    #[must_use]
    pub const fn end(&self) -> Timestamp {
        self.end
    }

    /// Returns true if the windows overlap or touch.
    ///
    /// Touching endpoints count: `[0, 5]` and `[5, 9]` overlap.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Returns true if this window overlaps `[earliest_end, latest_start]` in
    /// the sense used by session queries: `end >= earliest_end` and
    /// `start <= latest_start`.
    #[must_use]
    pub const fn matches(&self, earliest_end: Timestamp, latest_start: Timestamp) -> bool {
        self.end >= earliest_end && self.start <= latest_start
    }

    /// Returns the smallest window covering both.
    ///
    /// Only meaningful when [`Self::overlaps`] holds.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl Ord for SessionWindow {
    fn cmp(&self, other: &Self) -> Ordering {
        self.end
            .cmp(&other.end)
            .then_with(|| self.start.cmp(&other.start))
    }
}

impl PartialOrd for SessionWindow {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SessionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// A key paired with the session window it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Windowed<K> {
    key: K,
    window: SessionWindow,
}

impl<K> Windowed<K> {
    /// Creates a windowed key.
    pub const fn new(key: K, window: SessionWindow) -> Self {
        Self { key, window }
    }

    /// Returns the key.
    pub const fn key(&self) -> &K {
        &self.key
    }

    /// Returns the window.
    pub const fn window(&self) -> SessionWindow {
        self.window
    }

    /// Splits into key and window.
    pub fn into_parts(self) -> (K, SessionWindow) {
        (self.key, self.window)
    }

    /// Maps the key, keeping the window.
    pub fn map_key<T>(self, f: impl FnOnce(K) -> T) -> Windowed<T> {
        Windowed {
            key: f(self.key),
            window: self.window,
        }
    }

    /// Fallibly maps the key, keeping the window.
    pub fn try_map_key<T, E>(self, f: impl FnOnce(K) -> Result<T, E>) -> Result<Windowed<T>, E> {
        Ok(Windowed {
            key: f(self.key)?,
            window: self.window,
        })
    }
}

impl<K: fmt::Debug> fmt::Display for Windowed<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}@{}", self.key, self.window)
    }
}
