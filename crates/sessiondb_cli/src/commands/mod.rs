//! CLI command implementations.

pub mod compact;
pub mod dump;
pub mod inspect;

use sessiondb_core::{CoreError, SegmentedSessionStore, StoreDir};
use sessiondb_storage::{FileBackend, StorageError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// No store log exists at the given path.
    #[error("no store found at {}", .0.display())]
    NoStore(PathBuf),

    /// The log holds data but no manifest.
    #[error("store at {} has no manifest", .0.display())]
    MissingManifest(PathBuf),

    /// Engine error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Backend error outside the engine.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// JSON output failed.
    #[error("json output failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// A store opened with the layout recorded in its own manifest.
pub struct OpenedStore {
    /// The engine.
    pub store: SegmentedSessionStore,
    _dir: StoreDir,
}

/// Opens the store in `path` for inspection.
///
/// Fails instead of creating a new store when nothing is there.
pub fn open_existing(path: &Path) -> Result<OpenedStore, CliError> {
    let dir = lock_existing(path)?;
    let backend = FileBackend::open(&dir.log_path())?;
    let manifest = SegmentedSessionStore::read_manifest(&backend)?
        .ok_or_else(|| CliError::MissingManifest(path.to_path_buf()))?;
    tracing::debug!(
        name = %manifest.name,
        format_version = manifest.format_version,
        "read store manifest"
    );

    let store = SegmentedSessionStore::open(manifest.to_config(), Arc::new(backend))?;
    Ok(OpenedStore { store, _dir: dir })
}

/// Takes the directory lock of an existing store.
pub fn lock_existing(path: &Path) -> Result<StoreDir, CliError> {
    if !path.is_dir() {
        return Err(CliError::NoStore(path.to_path_buf()));
    }
    let dir = StoreDir::open(path)?;
    if dir.is_new_store() {
        return Err(CliError::NoStore(path.to_path_buf()));
    }
    Ok(dir)
}

/// Renders bytes as text when they are printable UTF-8, as hex otherwise.
pub fn display_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) if !text.chars().any(char::is_control) => text.to_string(),
        _ => {
            let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
            format!("0x{hex}")
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use sessiondb_core::{
        RecordContext, SegmentedSessionStore, SessionStore, SessionWindow, StoreConfig, Windowed,
    };
    use std::path::Path;
    use std::time::Duration;

    pub fn config() -> StoreConfig {
        StoreConfig::new("cli store", Duration::from_millis(1_000))
            .segment_interval(Duration::from_millis(100))
            .time_ordered_index(true)
    }

    pub fn create_store(path: &Path) {
        let mut store = SegmentedSessionStore::open_path(path, config()).unwrap();
        for (i, (key, start, end)) in [("a", 0, 50), ("b", 20, 120), ("c", 300, 420)]
            .into_iter()
            .enumerate()
        {
            let session = Windowed::new(key.as_bytes().to_vec(), SessionWindow::new(start, end).unwrap());
            let ctx = RecordContext::new("clicks", 0, i as u64);
            store
                .put(&session, format!("v{i}").as_bytes(), Some(&ctx))
                .unwrap();
        }
    }
}
