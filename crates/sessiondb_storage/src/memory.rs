//! In-memory storage backend for testing.

use crate::backend::{KvBackend, KvPair, ScanDirection};
use crate::batch::WriteBatch;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;

/// An in-memory ordered backend.
///
/// This backend keeps all data in a `BTreeMap` and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stores that don't need persistence
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads. A batch is
/// applied under a single write lock, so readers never observe half a batch.
///
/// # Example
///
/// ```rust
/// use sessiondb_storage::{InMemoryBackend, KvBackend, ScanDirection};
///
/// let backend = InMemoryBackend::new();
/// backend.put(b"k1", b"v1").unwrap();
/// backend.put(b"k2", b"v2").unwrap();
///
/// let pairs = backend.scan(b"k", b"l", ScanDirection::Backward, 10).unwrap();
/// assert_eq!(pairs[0].0, b"k2");
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend with pre-existing entries.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_entries(entries: BTreeMap<Vec<u8>, Vec<u8>>) -> Self {
        Self {
            map: RwLock::new(entries),
        }
    }

    /// Returns a copy of all entries in key order.
    #[must_use]
    pub fn entries(&self) -> BTreeMap<Vec<u8>, Vec<u8>> {
        self.map.read().clone()
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Returns true if no keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.map.write().clear();
    }
}

impl KvBackend for InMemoryBackend {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.map.read().get(key).cloned())
    }

    fn scan(
        &self,
        start: &[u8],
        end: &[u8],
        direction: ScanDirection,
        limit: usize,
    ) -> StorageResult<Vec<KvPair>> {
        scan_map(&self.map.read(), start, end, direction, limit)
    }

    fn write(&self, batch: WriteBatch) -> StorageResult<()> {
        batch.validate()?;
        batch.apply_to(&mut self.map.write());
        Ok(())
    }

    fn flush(&self) -> StorageResult<()> {
        // In-memory backend has no pending writes
        Ok(())
    }
}

/// Collects up to `limit` pairs of `map` within `[start, end)`.
pub(crate) fn scan_map(
    map: &BTreeMap<Vec<u8>, Vec<u8>>,
    start: &[u8],
    end: &[u8],
    direction: ScanDirection,
    limit: usize,
) -> StorageResult<Vec<KvPair>> {
    if start > end {
        return Err(StorageError::InvalidRange {
            start: start.to_vec(),
            end: end.to_vec(),
        });
    }

    let range = map.range::<[u8], _>((Bound::Included(start), Bound::Excluded(end)));
    let clone = |(k, v): (&Vec<u8>, &Vec<u8>)| (k.clone(), v.clone());

    let pairs = match direction {
        ScanDirection::Forward => range.take(limit).map(clone).collect(),
        ScanDirection::Backward => range.rev().take(limit).map(clone).collect(),
    };
    Ok(pairs)
}
