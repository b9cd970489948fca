//! Composition of the wrapper stack.

use super::{SegmentedSessionStore, SessionStore};
use crate::change_log::{ChangeLog, ChangeLoggingSessionStore};
use crate::config::StoreConfig;
use crate::error::CoreResult;
use crate::merge::SessionMerger;
use crate::metered::MeteredSessionStore;
use crate::stats::StoreStats;
use sessiondb_storage::KvBackend;
use std::sync::Arc;

#[cfg(feature = "std")]
use std::path::PathBuf;

enum Storage {
    Memory,
    Backend(Arc<dyn KvBackend>),
    #[cfg(feature = "std")]
    Path(PathBuf),
}

/// Builds a session store and the wrappers around it.
///
/// Layers, outermost first: metrics, change logging, engine. Each wrapper is
/// optional.
pub struct SessionStoreBuilder {
    config: StoreConfig,
    storage: Storage,
    merger: Option<Box<dyn SessionMerger>>,
    change_log: Option<Box<dyn ChangeLog>>,
    stats: Option<Arc<StoreStats>>,
}

impl SessionStoreBuilder {
    /// Starts a builder for an in-memory store.
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            storage: Storage::Memory,
            merger: None,
            change_log: None,
            stats: None,
        }
    }

    /// Stores sessions in `backend`.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn KvBackend>) -> Self {
        self.storage = Storage::Backend(backend);
        self
    }

    /// Stores sessions in the directory `path`.
    #[cfg(feature = "std")]
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage = Storage::Path(path.into());
        self
    }

    /// Sets the value merge policy.
    #[must_use]
    pub fn with_merger(mut self, merger: impl SessionMerger + 'static) -> Self {
        self.merger = Some(Box::new(merger));
        self
    }

    /// Logs committed changes to `log`.
    #[must_use]
    pub fn with_change_log(mut self, log: impl ChangeLog + 'static) -> Self {
        self.change_log = Some(Box::new(log));
        self
    }

    /// Counts operations into `stats`.
    #[must_use]
    pub fn with_metrics(mut self, stats: Arc<StoreStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Opens the engine and wraps it.
    pub fn build(self) -> CoreResult<Box<dyn SessionStore>> {
        let engine = match self.storage {
            Storage::Memory => SegmentedSessionStore::open_in_memory(self.config)?,
            Storage::Backend(backend) => SegmentedSessionStore::open(self.config, backend)?,
            #[cfg(feature = "std")]
            Storage::Path(path) => SegmentedSessionStore::open_path(&path, self.config)?,
        };
        let engine = match self.merger {
            Some(merger) => engine.with_boxed_merger(merger),
            None => engine,
        };

        let mut store: Box<dyn SessionStore> = Box::new(engine);
        if let Some(log) = self.change_log {
            store = Box::new(ChangeLoggingSessionStore::new(store, log));
        }
        if let Some(stats) = self.stats {
            store = Box::new(MeteredSessionStore::new(store, stats));
        }
        Ok(store)
    }
}
