//! Error types for sessiondb core.

use crate::store::SessionChange;
use crate::types::SegmentId;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in session store operations.
///
/// Absence is never an error: lookups return `None` and queries return empty
/// iterators. A write that is already behind the retention horizon is not an
/// error either; see [`crate::PutOutcome::Expired`].
#[derive(Debug, Error)]
pub enum CoreError {
    /// The storage backend failed. Fatal for the operation; the engine does
    /// not retry.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] sessiondb_storage::StorageError),

    /// I/O error outside the backend (directory handling, locking).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The caller broke an API contract.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the violated contract.
        message: String,
    },

    /// An open iterator lost one of its segments to retention, or a put
    /// replaced sessions in a segment it had not finished reading.
    ///
    /// Distinct from exhaustion: the query should be retried.
    #[error("iterator invalidated: {segment_id} was expired or rewritten while the iterator was open")]
    Invalidated {
        /// The segment that was dropped.
        segment_id: SegmentId,
    },

    /// The store was not configured for the requested operation.
    #[error("unsupported operation: {operation}")]
    Unsupported {
        /// Name of the operation.
        operation: String,
    },

    /// Stored keys or metadata could not be decoded.
    #[error("store corruption: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },

    /// The persisted store is incompatible with the requested configuration.
    #[error("invalid store format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// A write committed, but not all of its change records were appended.
    ///
    /// The store already holds the write, so it must not be retried.
    #[error("write committed but {unlogged} change record(s) were not logged: {source}")]
    ChangeLogFailed {
        /// Every change the write committed, in commit order.
        committed: Vec<SessionChange>,
        /// How many trailing entries of `committed` were not appended.
        unlogged: usize,
        /// The append failure.
        #[source]
        source: Box<CoreError>,
    },

    /// Another process holds the store directory.
    #[error("store locked: another process has exclusive access")]
    StoreLocked,
}

impl CoreError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Returns the changes of a write that committed despite this error.
    #[must_use]
    pub fn committed_changes(&self) -> Option<&[SessionChange]> {
        match self {
            Self::ChangeLogFailed { committed, .. } => Some(committed),
            _ => None,
        }
    }

    /// Returns true if retrying the query may succeed.
    #[must_use]
    pub fn is_invalidated(&self) -> bool {
        matches!(self, Self::Invalidated { .. })
    }
}
