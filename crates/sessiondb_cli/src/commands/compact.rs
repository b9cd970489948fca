//! Compact command implementation.

use super::{lock_existing, CliError};
use sessiondb_storage::FileBackend;
use std::path::Path;

/// Compaction statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactStats {
    /// Log size before compaction.
    pub bytes_before: u64,
    /// Log size after compaction.
    pub bytes_after: u64,
    /// Live keys written to the new log.
    pub keys: usize,
}

/// Rewrites the log of the store in `path` as a snapshot of its live keys.
///
/// Holds the directory lock, so it fails while the store is open elsewhere.
pub fn compact(path: &Path) -> Result<CompactStats, CliError> {
    let dir = lock_existing(path)?;
    let backend = FileBackend::open(&dir.log_path())?;
    let bytes_before = backend.log_size();
    backend.compact()?;
    let stats = CompactStats {
        bytes_before,
        bytes_after: backend.log_size(),
        keys: backend.len(),
    };
    tracing::info!(
        before = stats.bytes_before,
        after = stats.bytes_after,
        "compacted store log"
    );
    Ok(stats)
}

/// Runs the compact command.
pub fn run(path: &Path) -> Result<(), CliError> {
    println!("Compacting store at {}", path.display());
    let stats = compact(path)?;
    let saved = stats.bytes_before.saturating_sub(stats.bytes_after);
    let percent = if stats.bytes_before > 0 {
        saved as f64 / stats.bytes_before as f64 * 100.0
    } else {
        0.0
    };

    println!("  Live keys:   {}", stats.keys);
    println!("  Size before: {} bytes", stats.bytes_before);
    println!("  Size after:  {} bytes", stats.bytes_after);
    println!("  Space saved: {saved} bytes ({percent:.1}%)");
    Ok(())
}
