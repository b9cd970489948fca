//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The persisted data could not be decoded.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// The backend has been closed or put into a failed state.
    #[error("storage is closed")]
    Closed,

    /// A length does not fit the 4-byte field of the log encoding.
    #[error("length {len} exceeds the 4-byte length field")]
    TooLarge {
        /// Offending length in bytes.
        len: usize,
    },

    /// A range operation was given a lower bound above its upper bound.
    #[error("invalid range: start {start:?} is greater than end {end:?}")]
    InvalidRange {
        /// Requested lower bound.
        start: Vec<u8>,
        /// Requested upper bound.
        end: Vec<u8>,
    },
}

impl StorageError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }
}
