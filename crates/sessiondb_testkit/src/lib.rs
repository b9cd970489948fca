//! # sessiondb Testkit
//!
//! Test utilities for sessiondb.
//!
//! This crate provides:
//! - Store fixtures over memory and temporary file backends
//! - Property-based test generators using proptest
//! - A reference model of session store semantics
//! - A crash-injecting backend wrapper
//! - JSON snapshots of store contents for comparisons
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sessiondb_testkit::prelude::*;
//!
//! #[test]
//! fn merges_sessions() {
//!     let mut store = TestStore::memory(IndexMode::WithoutIndex);
//!     store.put(&session("a", 0, 5), &value(1), None).unwrap();
//!     // ...
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod model;
pub mod snapshot;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::model::*;
    pub use crate::snapshot::*;
    pub use sessiondb_core::{
        CoreError, CoreResult, PutOutcome, RecordContext, SessionStore, SessionWindow, Windowed,
    };
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use model::*;
pub use snapshot::*;
