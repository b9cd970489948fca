//! Persisted store manifest.

use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Current on-disk format version.
pub const FORMAT_VERSION: u16 = 1;

/// Layout parameters persisted with the store.
///
/// Segment ids and the physical key layout depend on the segment interval
/// and the index mode, so neither may change once data has been written.
/// The retention period may change between opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreManifest {
    /// Format version the store was created with.
    pub format_version: u16,
    /// Store name.
    pub name: String,
    /// Retention period in milliseconds at the last open.
    pub retention_ms: u64,
    /// Segment interval in milliseconds.
    pub segment_interval_ms: u64,
    /// Whether the time-ordered index is maintained.
    pub time_ordered_index: bool,
}

impl StoreManifest {
    /// Builds the manifest describing `config`.
    #[must_use]
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            name: config.name.clone(),
            retention_ms: config.retention_ms(),
            segment_interval_ms: config.segment_interval_ms(),
            time_ordered_index: config.time_ordered_index,
        }
    }

    /// Rebuilds a configuration able to reopen the store.
    #[must_use]
    pub fn to_config(&self) -> StoreConfig {
        StoreConfig::new(self.name.clone(), Duration::from_millis(self.retention_ms))
            .segment_interval(Duration::from_millis(self.segment_interval_ms))
            .time_ordered_index(self.time_ordered_index)
    }

    /// Checks that a store with this manifest can be opened with `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFormat`] if the format version is newer
    /// than supported, or the segment interval or index mode differ.
    pub fn check_compatible(&self, config: &StoreConfig) -> CoreResult<()> {
        if self.format_version > FORMAT_VERSION {
            return Err(CoreError::invalid_format(format!(
                "unsupported format version: {}",
                self.format_version
            )));
        }
        if self.segment_interval_ms != config.segment_interval_ms() {
            return Err(CoreError::invalid_format(format!(
                "store was created with segment interval {}ms, opened with {}ms",
                self.segment_interval_ms,
                config.segment_interval_ms()
            )));
        }
        if self.time_ordered_index != config.time_ordered_index {
            return Err(CoreError::invalid_format(format!(
                "store was created with time_ordered_index={}, opened with {}",
                self.time_ordered_index, config.time_ordered_index
            )));
        }
        Ok(())
    }

    /// Encodes the manifest as CBOR.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| CoreError::invalid_format(format!("failed to encode manifest: {e}")))?;
        Ok(buf)
    }

    /// Decodes a CBOR manifest.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        ciborium::from_reader(data)
            .map_err(|e| CoreError::invalid_format(format!("failed to decode manifest: {e}")))
    }
}
