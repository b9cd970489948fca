//! Dump command implementation.

use super::{display_bytes, open_existing, CliError};
use sessiondb_core::SessionStore;
use std::path::Path;

/// Options of the dump command.
#[derive(Debug, Default, Clone)]
pub struct DumpOptions {
    /// Smallest key to print.
    pub key_from: Option<String>,
    /// Largest key to print.
    pub key_to: Option<String>,
    /// Print in descending key order.
    pub reverse: bool,
    /// Maximum number of sessions to print.
    pub limit: Option<usize>,
}

/// A printed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpRow {
    /// Key, as text or hex.
    pub key: String,
    /// Window start.
    pub start: u64,
    /// Window end.
    pub end: u64,
    /// Value, as text or hex.
    pub value: String,
}

/// Reads the sessions selected by `options`.
pub fn collect(path: &Path, options: &DumpOptions) -> Result<Vec<DumpRow>, CliError> {
    let opened = open_existing(path)?;
    let store = &opened.store;

    let from = options.key_from.as_deref().map(str::as_bytes);
    let to = options.key_to.as_deref().map(str::as_bytes);
    let iter = if options.reverse {
        store.backward_fetch_range(from, to)?
    } else {
        store.fetch_range(from, to)?
    };

    let limit = options.limit.unwrap_or(usize::MAX);
    let mut rows = Vec::new();
    for entry in iter.take(limit) {
        let (windowed, value) = entry?;
        let window = windowed.window();
        rows.push(DumpRow {
            key: display_bytes(windowed.key()),
            start: window.start(),
            end: window.end(),
            value: display_bytes(&value),
        });
    }
    tracing::debug!(rows = rows.len(), "dumped sessions");
    Ok(rows)
}

/// Runs the dump command.
pub fn run(path: &Path, options: &DumpOptions) -> Result<(), CliError> {
    for row in collect(path, options)? {
        println!("{} [{}, {}] {}", row.key, row.start, row.end, row.value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::create_store;
    use tempfile::TempDir;

    fn keys(rows: &[DumpRow]) -> Vec<&str> {
        rows.iter().map(|row| row.key.as_str()).collect()
    }

    #[test]
    fn dumps_everything_in_key_order() {
        let temp = TempDir::new().unwrap();
        create_store(temp.path());

        let rows = collect(temp.path(), &DumpOptions::default()).unwrap();
        assert_eq!(keys(&rows), vec!["a", "b", "c"]);
        assert_eq!(
            rows[1],
            DumpRow {
                key: "b".into(),
                start: 20,
                end: 120,
                value: "v1".into(),
            }
        );
    }

    #[test]
    fn range_reverse_and_limit() {
        let temp = TempDir::new().unwrap();
        create_store(temp.path());

        let options = DumpOptions {
            key_from: Some("b".into()),
            key_to: None,
            reverse: true,
            limit: None,
        };
        assert_eq!(keys(&collect(temp.path(), &options).unwrap()), vec!["c", "b"]);

        let options = DumpOptions {
            limit: Some(1),
            ..DumpOptions::default()
        };
        assert_eq!(keys(&collect(temp.path(), &options).unwrap()), vec!["a"]);
    }
}
