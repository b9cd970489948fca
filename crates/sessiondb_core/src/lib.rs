//! # sessiondb Core
//!
//! Segmented, time-windowed session store engine.
//!
//! This crate provides:
//! - Session windows and the merge-on-put write path
//! - Time segmentation with retention-driven segment expiry
//! - Merged, restartable iterators over live segments
//! - Consumer position tracking persisted atomically with data
//! - Change logging and metrics wrappers
//!
//! ## Quick Start
//!
//! ```rust
//! use sessiondb_core::{SegmentedSessionStore, SessionStore, SessionWindow, StoreConfig, Windowed};
//! use std::time::Duration;
//!
//! let config = StoreConfig::new("clicks", Duration::from_secs(60));
//! let mut store = SegmentedSessionStore::open_in_memory(config).unwrap();
//!
//! let window = SessionWindow::new(0, 10).unwrap();
//! store.put(&Windowed::new(b"user".to_vec(), window), b"1", None).unwrap();
//!
//! let value = store.fetch_session(b"user", 0, 10).unwrap();
//! assert_eq!(value, Some(b"1".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_log;
mod config;
#[cfg(feature = "std")]
mod dir;
mod error;
mod iterator;
mod keys;
mod manifest;
mod merge;
mod metered;
mod position;
mod segment;
mod stats;
mod store;
mod typed;
mod types;
mod window;

pub use change_log::{ChangeEvent, ChangeFeed, ChangeLog, ChangeLoggingSessionStore, ChangeRecord};
pub use config::{StoreConfig, MIN_DEFAULT_SEGMENT_INTERVAL};
#[cfg(feature = "std")]
pub use dir::StoreDir;
pub use error::{CoreError, CoreResult};
pub use iterator::{SessionEntry, SessionIterator};
pub use manifest::{StoreManifest, FORMAT_VERSION};
pub use merge::{LatestValueMerger, SessionMerger};
pub use metered::MeteredSessionStore;
pub use position::{Position, RecordContext};
pub use segment::{Segment, SegmentDirectory, SegmentState};
pub use stats::{StatsSnapshot, StoreStats};
pub use store::{
    PutOutcome, SegmentSummary, SegmentedSessionStore, SessionChange, SessionStore,
    SessionStoreBuilder,
};
pub use typed::{Codec, TypedSessionIterator, TypedSessionStore};
pub use types::{SegmentId, Timestamp};
pub use window::{SessionWindow, Windowed};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
