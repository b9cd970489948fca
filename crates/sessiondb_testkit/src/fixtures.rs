//! Test fixtures and store helpers.
//!
//! Provides convenience functions for setting up test stores
//! and reading query results back in a comparable form.

use sessiondb_core::{
    CoreResult, SegmentedSessionStore, SessionIterator, SessionWindow, StoreConfig, Windowed,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Retention period used by the scenario tests, in milliseconds.
pub const RETENTION_PERIOD: u64 = 10_000;

/// Segment interval derived from [`RETENTION_PERIOD`], in milliseconds.
pub const SEGMENT_INTERVAL: u64 = 60_000;

/// Name of stores created by the fixtures.
pub const STORE_NAME: &str = "session store";

/// Whether a test store maintains the time-ordered index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    /// Key-ordered layout only.
    WithoutIndex,
    /// Key-ordered layout plus the `(end, key, start)` index.
    WithIndex,
}

impl IndexMode {
    /// Every mode, for parameterized tests.
    pub const ALL: [IndexMode; 2] = [IndexMode::WithoutIndex, IndexMode::WithIndex];

    /// Returns true if the index is maintained.
    #[must_use]
    pub const fn enabled(self) -> bool {
        matches!(self, Self::WithIndex)
    }
}

/// Configuration with the scenario retention and default segment interval.
#[must_use]
pub fn test_config(mode: IndexMode) -> StoreConfig {
    StoreConfig::new(STORE_NAME, Duration::from_millis(RETENTION_PERIOD))
        .time_ordered_index(mode.enabled())
}

/// Configuration with small segments and pages, so that short tests span
/// several segments and cursors page more than once.
#[must_use]
pub fn small_config(retention: u64, interval: u64, mode: IndexMode) -> StoreConfig {
    StoreConfig::new(STORE_NAME, Duration::from_millis(retention))
        .segment_interval(Duration::from_millis(interval))
        .time_ordered_index(mode.enabled())
        .scan_batch_size(2)
        .sync_on_write(false)
}

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: SegmentedSessionStore,
    config: StoreConfig,
    path: Option<PathBuf>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates an in-memory store with the scenario configuration.
    pub fn memory(mode: IndexMode) -> Self {
        Self::memory_with(test_config(mode))
    }

    /// Creates an in-memory store with `config`.
    pub fn memory_with(config: StoreConfig) -> Self {
        Self {
            store: SegmentedSessionStore::open_in_memory(config.clone())
                .expect("Failed to open in-memory store"),
            config,
            path: None,
            _temp_dir: None,
        }
    }

    /// Creates a file-backed store in a fresh temporary directory.
    pub fn file(mode: IndexMode) -> Self {
        Self::file_with(test_config(mode))
    }

    /// Creates a file-backed store with `config`.
    pub fn file_with(config: StoreConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("store");
        let store = SegmentedSessionStore::open_path(&path, config.clone())
            .expect("Failed to open file store");
        Self {
            store,
            config,
            path: Some(path),
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the store directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Closes and reopens a file-backed store, as a process restart would.
    ///
    /// # Panics
    ///
    /// Panics for in-memory stores.
    pub fn reopen(self) -> Self {
        let Self {
            store,
            config,
            path,
            _temp_dir,
        } = self;
        let path = path.expect("Only file stores can be reopened");
        drop(store);
        let store =
            SegmentedSessionStore::open_path(&path, config.clone()).expect("Failed to reopen store");
        Self {
            store,
            config,
            path: Some(path),
            _temp_dir,
        }
    }
}

impl std::ops::Deref for TestStore {
    type Target = SegmentedSessionStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

impl std::ops::DerefMut for TestStore {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.store
    }
}

/// Builds a windowed key from a string key.
///
/// # Panics
///
/// Panics if `start > end`.
pub fn session(key: &str, start: u64, end: u64) -> Windowed<Vec<u8>> {
    Windowed::new(key.as_bytes().to_vec(), window(start, end))
}

/// Builds a window.
///
/// # Panics
///
/// Panics if `start > end`.
pub fn window(start: u64, end: u64) -> SessionWindow {
    SessionWindow::new(start, end).expect("Invalid window")
}

/// Encodes a numeric test value.
pub fn value(v: u64) -> Vec<u8> {
    v.to_be_bytes().to_vec()
}

/// Decodes a value written by [`value`].
///
/// # Panics
///
/// Panics if `bytes` is not 8 bytes long.
pub fn decode_value(bytes: &[u8]) -> u64 {
    u64::from_be_bytes(bytes.try_into().expect("Test values are 8 bytes"))
}

/// A decoded query row: key, start, end, value.
pub type Row = (String, u64, u64, u64);

/// Drains an iterator into decoded rows, in iteration order.
pub fn rows(iter: SessionIterator) -> CoreResult<Vec<Row>> {
    iter.map(|entry| {
        let (windowed, bytes) = entry?;
        let window = windowed.window();
        let key = String::from_utf8_lossy(windowed.key()).into_owned();
        Ok((key, window.start(), window.end(), decode_value(&bytes)))
    })
    .collect()
}

/// Drains an iterator into the set of its values.
///
/// # Panics
///
/// Panics if the iterator yields an error.
pub fn values_to_set(iter: SessionIterator) -> BTreeSet<u64> {
    rows(iter)
        .expect("Iterator failed")
        .into_iter()
        .map(|(_, _, _, v)| v)
        .collect()
}
