//! Position tracking.
//!
//! A position records, per topic and partition, the highest source offset whose
//! write has been committed to the store. It is persisted in the same backend
//! batch as the write it accompanies.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifies the source record of a write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordContext {
    /// Source topic.
    pub topic: String,
    /// Source partition.
    pub partition: u32,
    /// Offset of the record within the partition.
    pub offset: u64,
}

impl RecordContext {
    /// Creates a record context.
    pub fn new(topic: impl Into<String>, partition: u32, offset: u64) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
        }
    }
}

/// Highest committed offset per topic and partition.
///
/// Offsets only move forward: [`Position::update`] keeps the larger of the
/// stored and the given offset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    offsets: BTreeMap<String, BTreeMap<u32, u64>>,
}

impl Position {
    /// Creates an empty position.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `offset` for `topic`/`partition`, keeping the maximum.
    pub fn update(&mut self, topic: &str, partition: u32, offset: u64) -> &mut Self {
        let partitions = self.offsets.entry(topic.to_string()).or_default();
        let stored = partitions.entry(partition).or_insert(offset);
        *stored = (*stored).max(offset);
        self
    }

    /// Records the offset of a source record.
    pub fn update_from(&mut self, context: &RecordContext) -> &mut Self {
        self.update(&context.topic, context.partition, context.offset)
    }

    /// Folds `other` into this position, entry by entry.
    pub fn merge_with(&mut self, other: &Self) -> &mut Self {
        for (topic, partitions) in &other.offsets {
            for (&partition, &offset) in partitions {
                self.update(topic, partition, offset);
            }
        }
        self
    }

    /// Returns the offset recorded for `topic`/`partition`.
    #[must_use]
    pub fn offset(&self, topic: &str, partition: u32) -> Option<u64> {
        self.offsets.get(topic)?.get(&partition).copied()
    }

    /// Returns the topics with at least one recorded partition.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.offsets.keys().map(String::as_str)
    }

    /// Returns the partitions and offsets of `topic`.
    pub fn partitions(&self, topic: &str) -> impl Iterator<Item = (u32, u64)> + '_ {
        self.offsets
            .get(topic)
            .into_iter()
            .flat_map(|p| p.iter().map(|(&partition, &offset)| (partition, offset)))
    }

    /// Returns true if no offset has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub(crate) fn encode(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| CoreError::corruption(format!("failed to encode position: {e}")))?;
        Ok(buf)
    }

    pub(crate) fn decode(data: &[u8]) -> CoreResult<Self> {
        ciborium::from_reader(data)
            .map_err(|e| CoreError::corruption(format!("failed to decode position: {e}")))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (topic, partitions)) in self.offsets.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{topic:?}: {partitions:?}")?;
        }
        write!(f, "}}")
    }
}
