//! Store directory management.
//!
//! A file-backed store lives in its own directory:
//!
//! ```text
//! <store_path>/
//! ├─ LOCK           # Advisory lock for single-writer
//! └─ sessions.log   # Batch log replayed by FileBackend
//! ```
//!
//! The store manifest is kept inside the log's metadata namespace, not as a
//! separate file, so it commits atomically with the data it describes.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "sessions.log";

/// Holds the exclusive lock on a store directory.
///
/// The lock is released when the `StoreDir` is dropped.
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
    _lock_file: File,
}

impl StoreDir {
    /// Opens a store directory, creating it if missing.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidFormat`] if `path` exists and is not a directory
    /// - [`CoreError::StoreLocked`] if another process holds the lock
    /// - [`CoreError::Io`] on file system errors
    pub fn open(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::StoreLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the batch log.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }

    /// Returns true if no log has been written yet.
    #[must_use]
    pub fn is_new_store(&self) -> bool {
        !self.log_path().exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("store");

        let dir = StoreDir::open(&path).unwrap();
        assert!(path.is_dir());
        assert!(path.join(LOCK_FILE).exists());
        assert!(dir.is_new_store());

        std::fs::write(dir.log_path(), b"").unwrap();
        assert!(!dir.is_new_store());
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let _first = StoreDir::open(temp.path()).unwrap();

        let second = StoreDir::open(temp.path());
        assert!(matches!(second, Err(CoreError::StoreLocked)));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        {
            let _dir = StoreDir::open(temp.path()).unwrap();
        }
        assert!(StoreDir::open(temp.path()).is_ok());
    }

    #[test]
    fn file_path_is_rejected() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("plain");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(
            StoreDir::open(&file),
            Err(CoreError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn paths_are_correct() {
        let temp = tempdir().unwrap();
        let dir = StoreDir::open(temp.path()).unwrap();
        assert_eq!(dir.path(), temp.path());
        assert_eq!(dir.log_path(), temp.path().join("sessions.log"));
    }
}
