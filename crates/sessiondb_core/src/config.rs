//! Store configuration.

use crate::error::{CoreError, CoreResult};
use std::time::Duration;

/// Smallest segment interval chosen by [`StoreConfig::new`].
pub const MIN_DEFAULT_SEGMENT_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for opening a session store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Store name, used in logs and by wrappers.
    pub name: String,

    /// How long a session stays queryable after its end time, measured in
    /// event time against the observed stream time.
    pub retention_period: Duration,

    /// Width of the event-time span covered by one segment.
    pub segment_interval: Duration,

    /// Whether to maintain the `(end, key, start)` index used by
    /// global time-range scans.
    pub time_ordered_index: bool,

    /// Number of entries an iterator reads from one segment per page.
    pub scan_batch_size: usize,

    /// Whether to sync the backend after every write (file-backed stores).
    pub sync_on_write: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new("sessions", Duration::from_secs(24 * 60 * 60))
    }
}

impl StoreConfig {
    /// Creates a configuration with the default segment interval of
    /// `max(retention / 2, 60s)`.
    #[must_use]
    pub fn new(name: impl Into<String>, retention_period: Duration) -> Self {
        Self {
            name: name.into(),
            retention_period,
            segment_interval: default_segment_interval(retention_period),
            time_ordered_index: false,
            scan_batch_size: 128,
            sync_on_write: true,
        }
    }

    /// Sets the segment interval.
    #[must_use]
    pub const fn segment_interval(mut self, interval: Duration) -> Self {
        self.segment_interval = interval;
        self
    }

    /// Enables or disables the time-ordered index.
    #[must_use]
    pub const fn time_ordered_index(mut self, value: bool) -> Self {
        self.time_ordered_index = value;
        self
    }

    /// Sets the iterator page size.
    #[must_use]
    pub const fn scan_batch_size(mut self, size: usize) -> Self {
        self.scan_batch_size = size;
        self
    }

    /// Sets whether to sync after every write.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Returns the retention period in milliseconds.
    #[must_use]
    pub fn retention_ms(&self) -> u64 {
        duration_ms(self.retention_period)
    }

    /// Returns the segment interval in milliseconds.
    #[must_use]
    pub fn segment_interval_ms(&self) -> u64 {
        duration_ms(self.segment_interval)
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for a zero retention period,
    /// segment interval or page size.
    pub fn validate(&self) -> CoreResult<()> {
        if self.retention_ms() == 0 {
            return Err(CoreError::invalid_argument(
                "retention period must be at least 1ms",
            ));
        }
        if self.segment_interval_ms() == 0 {
            return Err(CoreError::invalid_argument(
                "segment interval must be at least 1ms",
            ));
        }
        if self.scan_batch_size == 0 {
            return Err(CoreError::invalid_argument("scan batch size must be positive"));
        }
        Ok(())
    }
}

fn default_segment_interval(retention: Duration) -> Duration {
    (retention / 2).max(MIN_DEFAULT_SEGMENT_INTERVAL)
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_segment_interval_is_half_retention() {
        let config = StoreConfig::new("s", Duration::from_secs(3600));
        assert_eq!(config.segment_interval, Duration::from_secs(1800));
    }

    #[test]
    fn default_segment_interval_has_floor() {
        let config = StoreConfig::new("s", Duration::from_secs(10));
        assert_eq!(config.segment_interval_ms(), 60_000);
        assert_eq!(config.retention_ms(), 10_000);
    }

    #[test]
    fn builder_pattern() {
        let config = StoreConfig::new("s", Duration::from_secs(10))
            .segment_interval(Duration::from_millis(500))
            .time_ordered_index(true)
            .scan_batch_size(4)
            .sync_on_write(false);

        assert_eq!(config.segment_interval_ms(), 500);
        assert!(config.time_ordered_index);
        assert_eq!(config.scan_batch_size, 4);
        assert!(!config.sync_on_write);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_values() {
        let zero_retention = StoreConfig::new("s", Duration::ZERO);
        assert!(zero_retention.validate().is_err());

        let zero_interval =
            StoreConfig::new("s", Duration::from_secs(1)).segment_interval(Duration::ZERO);
        assert!(zero_interval.validate().is_err());

        let zero_batch = StoreConfig::new("s", Duration::from_secs(1)).scan_batch_size(0);
        assert!(matches!(
            zero_batch.validate(),
            Err(CoreError::InvalidArgument { .. })
        ));
    }
}
