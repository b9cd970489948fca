//! Fault injection for session stores.
//!
//! [`CrashableBackend`] wraps another backend and fails writes after a
//! configurable number of batches, as a process crash or a full disk would.
//! A failed batch is never applied, so reopening a store over the wrapped
//! backend shows exactly the state a restarted process would recover.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sessiondb_testkit::crash::CrashableBackend;
//!
//! let backend = Arc::new(CrashableBackend::new(Arc::new(InMemoryBackend::new())));
//! let mut store = SegmentedSessionStore::open(config, backend.clone())?;
//! backend.crash_after_writes(3);
//! ```

use sessiondb_storage::{KvBackend, KvPair, ScanDirection, StorageError, StorageResult, WriteBatch};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A backend wrapper that can simulate crashes and I/O failures.
pub struct CrashableBackend {
    inner: Arc<dyn KvBackend>,
    crash_after_writes: AtomicUsize,
    writes: AtomicUsize,
    crashed: AtomicBool,
    fail_reads: AtomicBool,
    fail_on_flush: AtomicBool,
}

impl CrashableBackend {
    /// Creates a crashable backend wrapping `inner`.
    pub fn new(inner: Arc<dyn KvBackend>) -> Self {
        Self {
            inner,
            crash_after_writes: AtomicUsize::new(usize::MAX),
            writes: AtomicUsize::new(0),
            crashed: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            fail_on_flush: AtomicBool::new(false),
        }
    }

    /// Returns the wrapped backend, which holds everything committed so far.
    pub fn inner(&self) -> &Arc<dyn KvBackend> {
        &self.inner
    }

    /// Lets `count` more batches through, then fails every write.
    pub fn crash_after_writes(&self, count: usize) {
        let done = self.writes.load(Ordering::SeqCst);
        self.crash_after_writes
            .store(done.saturating_add(count), Ordering::SeqCst);
    }

    /// Sets whether reads should fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Sets whether flush should fail.
    pub fn set_fail_on_flush(&self, fail: bool) {
        self.fail_on_flush.store(fail, Ordering::SeqCst);
    }

    /// Clears every failure.
    pub fn reset(&self) {
        self.crash_after_writes.store(usize::MAX, Ordering::SeqCst);
        self.crashed.store(false, Ordering::SeqCst);
        self.fail_reads.store(false, Ordering::SeqCst);
        self.fail_on_flush.store(false, Ordering::SeqCst);
    }

    /// Returns whether a write has failed.
    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    /// Returns the number of batches committed through this wrapper.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_reads(&self) -> StorageResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(simulated("simulated read failure"));
        }
        Ok(())
    }
}

fn simulated(message: &str) -> StorageError {
    StorageError::Io(io::Error::new(io::ErrorKind::Other, message.to_string()))
}

impl KvBackend for CrashableBackend {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.check_reads()?;
        self.inner.get(key)
    }

    fn scan(
        &self,
        start: &[u8],
        end: &[u8],
        direction: ScanDirection,
        limit: usize,
    ) -> StorageResult<Vec<KvPair>> {
        self.check_reads()?;
        self.inner.scan(start, end, direction, limit)
    }

    fn write(&self, batch: WriteBatch) -> StorageResult<()> {
        let threshold = self.crash_after_writes.load(Ordering::SeqCst);
        if self.has_crashed() || self.writes.load(Ordering::SeqCst) >= threshold {
            self.crashed.store(true, Ordering::SeqCst);
            return Err(simulated("simulated crash during write"));
        }
        self.inner.write(batch)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn flush(&self) -> StorageResult<()> {
        if self.fail_on_flush.load(Ordering::SeqCst) {
            self.crashed.store(true, Ordering::SeqCst);
            return Err(simulated("simulated crash during flush"));
        }
        self.inner.flush()
    }
}
