//! File-based storage backend for persistent storage.
//!
//! The file is an append-only log of committed batches:
//!
//! ```text
//! | magic "SDBL" (4) | payload_len (4) | payload (N) | crc32 (4) |
//! ```
//!
//! The payload is an encoded [`WriteBatch`]; the CRC covers the magic, length
//! and payload. On open every record is replayed into an in-memory ordered map.
//! A truncated or CRC-failing final record is a torn write from a crash: it is
//! discarded and the file is truncated back to the last complete record.
//!
//! If a failed append cannot be truncated away, the log stops accepting
//! writes ([`StorageError::Closed`]) until [`FileBackend::compact`] rewrites
//! it from memory.

use crate::backend::{KvBackend, KvPair, ScanDirection};
use crate::batch::{length_field, WriteBatch};
use crate::error::{StorageError, StorageResult};
use crate::memory::scan_map;
use crc32fast::Hasher as Crc32;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Magic bytes identifying a log record.
const RECORD_MAGIC: [u8; 4] = *b"SDBL";

/// magic (4) + payload_len (4)
const HEADER_SIZE: usize = 8;

const CRC_SIZE: usize = 4;

#[derive(Debug)]
struct LogState {
    file: File,
    map: BTreeMap<Vec<u8>, Vec<u8>>,
    log_size: u64,
    /// Set when a partial record may remain at the end of the file.
    failed: bool,
}

/// A file-based ordered backend.
///
/// Data survives process restarts. Reads are served from memory; every
/// [`KvBackend::write`] appends exactly one log record.
///
/// # Durability
///
/// - Each batch is written with a single `write_all` followed by `flush`
/// - With `sync_on_write` the file is also `sync_data`-ed before the write returns
/// - A failed append is rolled back by truncating the file to its previous size
/// - If that truncation also fails, writes return [`StorageError::Closed`]
///   until [`FileBackend::compact`] succeeds
///
/// # Example
///
/// ```no_run
/// use sessiondb_storage::{FileBackend, KvBackend};
/// use std::path::Path;
///
/// let backend = FileBackend::open(Path::new("sessions.log")).unwrap();
/// backend.put(b"key", b"persistent value").unwrap();
/// backend.flush().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    sync_on_write: bool,
    state: RwLock<LogState>,
}

impl FileBackend {
    /// Opens or creates a log file at the given path and replays it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, or if a record before
    /// the tail fails its checksum.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::open_with_options(path, false)
    }

    /// Opens or creates a log file, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Opens or creates a log file with explicit durability settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or replayed.
    pub fn open_with_options(path: &Path, sync_on_write: bool) -> StorageResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        let (map, valid_len) = replay(&data)?;
        if valid_len < data.len() as u64 {
            tracing::warn!(
                path = %path.display(),
                discarded = data.len() as u64 - valid_len,
                "discarding torn record at end of log"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        tracing::debug!(path = %path.display(), keys = map.len(), "opened log backend");

        Ok(Self {
            path: path.to_path_buf(),
            sync_on_write,
            state: RwLock::new(LogState {
                file,
                map,
                log_size: valid_len,
                failed: false,
            }),
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the size of the log in bytes.
    #[must_use]
    pub fn log_size(&self) -> u64 {
        self.state.read().log_size
    }

    /// Returns the number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().map.len()
    }

    /// Returns true if no keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().map.is_empty()
    }

    /// Returns true if a failed rollback left the log refusing writes.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.state.read().failed
    }

    /// Rewrites the log as a single snapshot record.
    ///
    /// The snapshot is written to a temporary file, synced, and renamed over
    /// the log, so a crash leaves either the old or the new log in place.
    /// A successful compaction also clears the failed state.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::TooLarge`] if the snapshot does not fit one
    /// record, or an I/O error if it cannot be written or installed.
    pub fn compact(&self) -> StorageResult<u64> {
        let mut state = self.state.write();
        let before = state.log_size;

        let mut snapshot = WriteBatch::new();
        for (key, value) in &state.map {
            snapshot.put(key.clone(), value.clone());
        }
        let record = encode_record(&snapshot)?;

        let temp_path = self.path.with_extension("compact");
        {
            let mut temp = File::create(&temp_path)?;
            temp.write_all(&record)?;
            temp.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;

        state.file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        state.log_size = record.len() as u64;
        if state.failed {
            tracing::info!(path = %self.path.display(), "log rewritten, accepting writes again");
            state.failed = false;
        }

        tracing::debug!(before, after = state.log_size, "compacted log");
        Ok(before.saturating_sub(state.log_size))
    }
}

impl KvBackend for FileBackend {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.state.read().map.get(key).cloned())
    }

    fn scan(
        &self,
        start: &[u8],
        end: &[u8],
        direction: ScanDirection,
        limit: usize,
    ) -> StorageResult<Vec<KvPair>> {
        scan_map(&self.state.read().map, start, end, direction, limit)
    }

    fn write(&self, batch: WriteBatch) -> StorageResult<()> {
        batch.validate()?;
        if batch.is_empty() {
            return Ok(());
        }

        let record = encode_record(&batch)?;
        let mut state = self.state.write();
        if state.failed {
            return Err(StorageError::Closed);
        }
        let previous = state.log_size;

        if let Err(err) = append_record(&mut state.file, &record, self.sync_on_write) {
            let rollback = state.file.set_len(previous);
            note_rollback(&mut state, &self.path, rollback);
            return Err(err);
        }

        state.log_size += record.len() as u64;
        batch.apply_to(&mut state.map);
        Ok(())
    }

    fn flush(&self) -> StorageResult<()> {
        let mut state = self.state.write();
        if state.failed {
            return Err(StorageError::Closed);
        }
        state.file.flush()?;
        state.file.sync_data()?;
        Ok(())
    }
}

fn append_record(file: &mut File, record: &[u8], sync: bool) -> StorageResult<()> {
    file.seek(SeekFrom::End(0))?;
    file.write_all(record)?;
    file.flush()?;
    if sync {
        file.sync_data()?;
    }
    Ok(())
}

/// A partial record left behind would be replayed or reported as corruption
/// on the next open, so the log refuses writes until it is rewritten.
fn note_rollback(state: &mut LogState, path: &Path, rollback: std::io::Result<()>) {
    if let Err(err) = rollback {
        tracing::error!(
            path = %path.display(),
            log_size = state.log_size,
            error = %err,
            "failed to truncate partial append, refusing writes until compaction"
        );
        state.failed = true;
    }
}

fn encode_record(batch: &WriteBatch) -> StorageResult<Vec<u8>> {
    let payload = batch.encode()?;
    let payload_len = length_field(payload.len())?;
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    buf.extend_from_slice(&RECORD_MAGIC);
    buf.extend_from_slice(&payload_len);
    buf.extend_from_slice(&payload);

    let mut hasher = Crc32::new();
    hasher.update(&buf);
    buf.extend_from_slice(&hasher.finalize().to_le_bytes());
    Ok(buf)
}

/// Replays log records, returning the rebuilt map and the length of the valid prefix.
fn replay(data: &[u8]) -> StorageResult<(BTreeMap<Vec<u8>, Vec<u8>>, u64)> {
    let mut map = BTreeMap::new();
    let mut offset = 0usize;

    while offset < data.len() {
        let remaining = &data[offset..];
        if remaining.len() < HEADER_SIZE {
            break;
        }
        if remaining[..4] != RECORD_MAGIC {
            return Err(StorageError::corrupted(format!(
                "bad record magic at offset {offset}"
            )));
        }

        let payload_len =
            u32::from_le_bytes([remaining[4], remaining[5], remaining[6], remaining[7]]) as usize;
        let record_len = HEADER_SIZE + payload_len + CRC_SIZE;
        if remaining.len() < record_len {
            break;
        }

        let body = &remaining[..HEADER_SIZE + payload_len];
        let stored = &remaining[HEADER_SIZE + payload_len..record_len];
        let stored = u32::from_le_bytes([stored[0], stored[1], stored[2], stored[3]]);
        let mut hasher = Crc32::new();
        hasher.update(body);
        if hasher.finalize() != stored {
            if offset + record_len == data.len() {
                break;
            }
            return Err(StorageError::corrupted(format!(
                "checksum mismatch in record at offset {offset}"
            )));
        }

        WriteBatch::decode(&body[HEADER_SIZE..])?.apply_to(&mut map);
        offset += record_len;
    }

    Ok((map, offset as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tempfile::tempdir;

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.log");

        let backend = FileBackend::open(&path).unwrap();
        assert!(backend.is_empty());
        assert_eq!(backend.log_size(), 0);
        assert!(path.exists());
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.log");

        {
            let backend = FileBackend::open(&path).unwrap();
            backend.put(b"a", b"1").unwrap();
            backend.put(b"b", b"2").unwrap();
            backend.delete(b"a").unwrap();
            backend.flush().unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.get(b"a").unwrap(), None);
        assert_eq!(backend.get(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn file_torn_tail_is_discarded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.log");

        let good_len = {
            let backend = FileBackend::open(&path).unwrap();
            backend.put(b"kept", b"1").unwrap();
            let good_len = backend.log_size();
            let mut batch = WriteBatch::new();
            batch.put(b"torn".to_vec(), b"2".to_vec());
            backend.write(batch).unwrap();
            good_len
        };

        // Chop the last record in half.
        let full = fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(good_len + (full - good_len) / 2).unwrap();

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.get(b"kept").unwrap(), Some(b"1".to_vec()));
        assert_eq!(backend.get(b"torn").unwrap(), None);
        assert_eq!(backend.log_size(), good_len);
    }

    #[test]
    fn file_corrupt_tail_checksum_is_discarded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.log");

        {
            let backend = FileBackend::open(&path).unwrap();
            backend.put(b"a", b"1").unwrap();
            backend.put(b"b", b"2").unwrap();
        }

        let mut data = fs::read(&path).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        fs::write(&path, &data).unwrap();

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(backend.get(b"b").unwrap(), None);
    }

    #[test]
    fn file_corrupt_middle_record_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.log");

        {
            let backend = FileBackend::open(&path).unwrap();
            backend.put(b"a", b"1").unwrap();
            backend.put(b"b", b"2").unwrap();
        }

        let mut data = fs::read(&path).unwrap();
        data[HEADER_SIZE + 2] ^= 0xFF;
        fs::write(&path, &data).unwrap();

        let result = FileBackend::open(&path);
        assert!(matches!(result, Err(StorageError::Corrupted(_))));
    }

    #[test]
    fn file_compact_preserves_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.log");

        let backend = FileBackend::open(&path).unwrap();
        for i in 0..20u8 {
            backend.put(&[i], &[i]).unwrap();
        }
        backend.delete_range(&[0], &[15]).unwrap();

        let before = backend.log_size();
        let reclaimed = backend.compact().unwrap();
        assert!(reclaimed > 0);
        assert_eq!(backend.log_size(), before - reclaimed);

        // Writes after compaction land in the new log.
        backend.put(b"z", b"z").unwrap();
        drop(backend);

        let reopened = FileBackend::open(&path).unwrap();
        assert_eq!(reopened.len(), 6);
        assert_eq!(reopened.get(&[17]).unwrap(), Some(vec![17]));
        assert_eq!(reopened.get(b"z").unwrap(), Some(b"z".to_vec()));
    }

    #[test]
    fn file_scan_backward() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(&dir.path().join("test.log")).unwrap();
        backend.put(b"a", b"1").unwrap();
        backend.put(b"b", b"2").unwrap();

        let pairs = backend.scan(b"a", b"c", ScanDirection::Backward, 1).unwrap();
        assert_eq!(pairs, vec![(b"b".to_vec(), b"2".to_vec())]);
    }

    #[test]
    fn file_create_with_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("path").join("test.log");

        let backend = FileBackend::open_with_create_dirs(&path).unwrap();
        assert!(backend.is_empty());
        assert_eq!(backend.path(), path);
    }

    #[test]
    fn file_failed_rollback_refuses_writes_until_compaction() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.log");
        let backend = FileBackend::open(&path).unwrap();
        backend.put(b"a", b"1").unwrap();

        {
            let mut state = backend.state.write();
            let rollback = Err(io::Error::new(io::ErrorKind::Other, "disk gone"));
            note_rollback(&mut state, &path, rollback);
        }
        assert!(backend.is_failed());

        assert!(matches!(backend.put(b"b", b"2"), Err(StorageError::Closed)));
        assert!(matches!(backend.flush(), Err(StorageError::Closed)));
        assert_eq!(backend.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(backend.get(b"b").unwrap(), None);

        backend.compact().unwrap();
        assert!(!backend.is_failed());
        backend.put(b"b", b"2").unwrap();
        drop(backend);

        let reopened = FileBackend::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
    }

    #[test]
    fn file_successful_rollback_keeps_accepting_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.log");
        let backend = FileBackend::open(&path).unwrap();

        note_rollback(&mut backend.state.write(), &path, Ok(()));
        assert!(!backend.is_failed());
        backend.put(b"a", b"1").unwrap();
    }
}
