//! # sessiondb Storage
//!
//! Ordered key-value backend trait and implementations for sessiondb.
//!
//! This crate provides the lowest-level storage abstraction for sessiondb.
//! Backends are **opaque sorted byte maps** - they do not interpret the keys
//! or values they store.
//!
//! ## Design Principles
//!
//! - Backends offer point reads, ordered range scans and atomic batches
//! - No knowledge of sessions, segments or windows
//! - Must be `Send + Sync` and usable through `&self`
//! - sessiondb owns all key layout interpretation
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral storage
//! - [`FileBackend`] - Append-only batch log replayed on open
//!
//! ## Example
//!
//! ```rust
//! use sessiondb_storage::{InMemoryBackend, KvBackend, ScanDirection, WriteBatch};
//!
//! let backend = InMemoryBackend::new();
//! let mut batch = WriteBatch::new();
//! batch.put(b"a".to_vec(), b"1".to_vec()).put(b"b".to_vec(), b"2".to_vec());
//! backend.write(batch).unwrap();
//!
//! let pairs = backend.scan(b"a", b"z", ScanDirection::Forward, 10).unwrap();
//! assert_eq!(pairs.len(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod batch;
mod error;
mod file;
mod memory;

pub use backend::{KvBackend, KvPair, ScanDirection};
pub use batch::{BatchOp, WriteBatch};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
