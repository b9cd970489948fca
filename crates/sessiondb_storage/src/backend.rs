//! Storage backend trait definition.

use crate::batch::WriteBatch;
use crate::error::StorageResult;

/// A key/value pair returned by a scan.
pub type KvPair = (Vec<u8>, Vec<u8>);

/// Order in which a scan visits keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanDirection {
    /// Ascending byte-lexicographic order.
    Forward,
    /// Descending byte-lexicographic order.
    Backward,
}

impl ScanDirection {
    /// Returns `true` for [`ScanDirection::Forward`].
    #[must_use]
    pub const fn is_forward(self) -> bool {
        matches!(self, Self::Forward)
    }
}

/// An ordered key-value backend for sessiondb.
///
/// Backends are **opaque sorted byte maps**. Keys compare byte-lexicographically;
/// sessiondb owns the key layout and never relies on anything beyond ordering.
///
/// # Invariants
///
/// - Ranges are half-open: `start` is included, `end` is excluded
/// - `write` is atomic: after a crash either every op of the batch is visible
///   or none is
/// - `scan` returns at most `limit` pairs, starting at the low end of the range
///   for [`ScanDirection::Forward`] and at the high end for
///   [`ScanDirection::Backward`]
/// - Backends must be `Send + Sync`; all methods take `&self` so a backend can
///   be shared between a writer and open readers
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait KvBackend: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable.
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Scans up to `limit` pairs with keys in `[start, end)`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::InvalidRange`] if `start > end`, or an
    /// error if the backend is unavailable.
    fn scan(
        &self,
        start: &[u8],
        end: &[u8],
        direction: ScanDirection,
        limit: usize,
    ) -> StorageResult<Vec<KvPair>>;

    /// Applies every operation of `batch` atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch could not be made durable. In that case
    /// none of its operations are visible.
    fn write(&self, batch: WriteBatch) -> StorageResult<()>;

    /// Flushes buffered writes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&self) -> StorageResult<()>;

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write(batch)
    }

    /// Deletes `key` if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn delete(&self, key: &[u8]) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write(batch)
    }

    /// Deletes every key in `[start, end)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn delete_range(&self, start: &[u8], end: &[u8]) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        batch.delete_range(start, end);
        self.write(batch)
    }
}
