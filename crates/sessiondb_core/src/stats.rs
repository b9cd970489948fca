//! Session store statistics.
//!
//! # Usage
//!
//! ```rust,ignore
//! let stats = Arc::new(StoreStats::new());
//! let mut store = MeteredSessionStore::new(engine, Arc::clone(&stats));
//!
//! store.put(&session, b"value", None)?;
//! println!("puts: {}", stats.puts());
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Operation counters of one store.
///
/// All counters are atomic and monotonically increasing.
#[derive(Debug, Default)]
pub struct StoreStats {
    puts: AtomicU64,
    removes: AtomicU64,
    fetches: AtomicU64,
    range_queries: AtomicU64,
    expired_drops: AtomicU64,
    merges: AtomicU64,
    errors: AtomicU64,
    bytes_written: AtomicU64,
    bytes_read: AtomicU64,
}

impl StoreStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_put(&self, bytes: u64) {
        self.puts.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_remove(&self) {
        self.removes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fetch(&self, bytes: u64) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_range_query(&self) {
        self.range_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_expired_drop(&self) {
        self.expired_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_merges(&self, superseded: u64) {
        self.merges.fetch_add(superseded, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of puts, including expired ones.
    pub fn puts(&self) -> u64 {
        self.puts.load(Ordering::Relaxed)
    }

    /// Returns the number of removes.
    pub fn removes(&self) -> u64 {
        self.removes.load(Ordering::Relaxed)
    }

    /// Returns the number of point lookups.
    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Returns the number of iterator-returning queries.
    pub fn range_queries(&self) -> u64 {
        self.range_queries.load(Ordering::Relaxed)
    }

    /// Returns the number of puts dropped as expired on arrival.
    pub fn expired_drops(&self) -> u64 {
        self.expired_drops.load(Ordering::Relaxed)
    }

    /// Returns the number of stored sessions superseded by merges.
    pub fn merges(&self) -> u64 {
        self.merges.load(Ordering::Relaxed)
    }

    /// Returns the number of failed operations.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Returns the total size of keys and values passed to put.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Returns the total size of values returned by point lookups.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            puts: self.puts(),
            removes: self.removes(),
            fetches: self.fetches(),
            range_queries: self.range_queries(),
            expired_drops: self.expired_drops(),
            merges: self.merges(),
            errors: self.errors(),
            bytes_written: self.bytes_written(),
            bytes_read: self.bytes_read(),
        }
    }
}

/// A point-in-time copy of [`StoreStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Number of puts.
    pub puts: u64,
    /// Number of removes.
    pub removes: u64,
    /// Number of point lookups.
    pub fetches: u64,
    /// Number of iterator-returning queries.
    pub range_queries: u64,
    /// Number of puts dropped as expired.
    pub expired_drops: u64,
    /// Number of sessions superseded by merges.
    pub merges: u64,
    /// Number of failed operations.
    pub errors: u64,
    /// Bytes passed to put.
    pub bytes_written: u64,
    /// Bytes returned by point lookups.
    pub bytes_read: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        assert_eq!(StoreStats::new().snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn record_operations() {
        let stats = StoreStats::new();
        stats.record_put(10);
        stats.record_put(5);
        stats.record_fetch(7);
        stats.record_merges(3);
        stats.record_expired_drop();

        let snap = stats.snapshot();
        assert_eq!(snap.puts, 2);
        assert_eq!(snap.bytes_written, 15);
        assert_eq!(snap.fetches, 1);
        assert_eq!(snap.bytes_read, 7);
        assert_eq!(snap.merges, 3);
        assert_eq!(snap.expired_drops, 1);
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(StoreStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..100 {
                        s.record_remove();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(stats.removes(), 800);
    }
}
