//! Reference model of session store semantics.
//!
//! The model keeps every session of every key in plain ordered maps and
//! applies the merge, retention and position rules directly. Property tests
//! run the same operations against the model and a real store and compare
//! the results.

use crate::generators::StoreOperation;
use sessiondb_core::{Position, RecordContext};
use std::collections::BTreeMap;

/// `(key, start, end, value)`
pub type ModelRow = (String, u64, u64, u64);

/// A naive session store with the latest-value merge policy.
#[derive(Debug, Clone)]
pub struct ReferenceModel {
    retention: u64,
    stream_time: u64,
    /// key -> (end, start) -> value
    sessions: BTreeMap<String, BTreeMap<(u64, u64), u64>>,
    position: Position,
}

impl ReferenceModel {
    /// Creates an empty model with the given retention in milliseconds.
    pub fn new(retention: u64) -> Self {
        Self {
            retention,
            stream_time: 0,
            sessions: BTreeMap::new(),
            position: Position::new(),
        }
    }

    /// Returns the observed stream time.
    pub fn observed_stream_time(&self) -> u64 {
        self.stream_time
    }

    /// Returns the position.
    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Returns the earliest window end still live.
    pub fn horizon(&self) -> u64 {
        horizon_at(self.stream_time, self.retention)
    }

    /// Applies a put. Returns the merged window, or `None` if the put was
    /// expired on arrival.
    pub fn put(
        &mut self,
        key: &str,
        start: u64,
        end: u64,
        value: u64,
        context: Option<&RecordContext>,
    ) -> Option<(u64, u64)> {
        let stream_time = self.stream_time.max(end);
        let horizon = horizon_at(stream_time, self.retention);
        if end < horizon {
            return None;
        }

        let sessions = self.sessions.entry(key.to_string()).or_default();
        sessions.retain(|&(stored_end, _), _| stored_end >= horizon);
        let overlapping: Vec<(u64, u64)> = sessions
            .keys()
            .filter(|&&(stored_end, stored_start)| stored_end >= start && stored_start <= end)
            .copied()
            .collect();

        let mut merged = (start, end);
        for (stored_end, stored_start) in overlapping {
            sessions.remove(&(stored_end, stored_start));
            merged = (merged.0.min(stored_start), merged.1.max(stored_end));
        }
        sessions.insert((merged.1, merged.0), value);

        self.stream_time = stream_time;
        if let Some(context) = context {
            self.position.update_from(context);
        }
        Some(merged)
    }

    /// Removes an exact session. Returns true if it was live.
    pub fn remove(&mut self, key: &str, start: u64, end: u64, context: Option<&RecordContext>) -> bool {
        if end < self.horizon() {
            return false;
        }
        let removed = self
            .sessions
            .get_mut(key)
            .and_then(|sessions| sessions.remove(&(end, start)))
            .is_some();
        if removed {
            if let Some(context) = context {
                self.position.update_from(context);
            }
        }
        removed
    }

    /// Applies a generated operation.
    pub fn apply(&mut self, op: &StoreOperation, context: Option<&RecordContext>) {
        match op {
            StoreOperation::Put {
                key,
                start,
                end,
                value,
            } => {
                self.put(key, *start, *end, *value, context);
            }
            StoreOperation::Remove { key, start, end } => {
                self.remove(key, *start, *end, context);
            }
        }
    }

    /// Returns the value of an exact live session.
    pub fn fetch_session(&self, key: &str, start: u64, end: u64) -> Option<u64> {
        if end < self.horizon() {
            return None;
        }
        self.sessions.get(key)?.get(&(end, start)).copied()
    }

    /// Live sessions of `key` matching the time bounds, oldest first.
    pub fn find_sessions(&self, key: &str, earliest_end: u64, latest_start: u64) -> Vec<ModelRow> {
        self.find_session_range(Some(key), Some(key), earliest_end, latest_start)
    }

    /// Live sessions of keys in `[from, to]` matching the time bounds, in
    /// `(key, end, start)` order.
    pub fn find_session_range(
        &self,
        from: Option<&str>,
        to: Option<&str>,
        earliest_end: u64,
        latest_start: u64,
    ) -> Vec<ModelRow> {
        let horizon = self.horizon();
        self.sessions
            .iter()
            .filter(|(key, _)| from.map_or(true, |f| key.as_str() >= f))
            .filter(|(key, _)| to.map_or(true, |t| key.as_str() <= t))
            .flat_map(|(key, sessions)| {
                sessions
                    .iter()
                    .filter(move |(&(end, start), _)| {
                        end >= horizon && end >= earliest_end && start <= latest_start
                    })
                    .map(move |(&(end, start), &value)| (key.clone(), start, end, value))
            })
            .collect()
    }

    /// Live sessions with `earliest_end <= end <= latest_end` in
    /// `(end, key, start)` order.
    pub fn find_sessions_by_end_time(&self, earliest_end: u64, latest_end: u64) -> Vec<ModelRow> {
        let mut rows: Vec<ModelRow> = self
            .find_session_range(None, None, earliest_end, u64::MAX)
            .into_iter()
            .filter(|&(_, _, end, _)| end <= latest_end)
            .collect();
        rows.sort_by(|a, b| (a.2, &a.0, a.1).cmp(&(b.2, &b.0, b.1)));
        rows
    }

    /// Every live session in `(key, end, start)` order.
    pub fn all(&self) -> Vec<ModelRow> {
        self.find_session_range(None, None, 0, u64::MAX)
    }
}

/// Earliest live window end for a stream time.
pub fn horizon_at(stream_time: u64, retention: u64) -> u64 {
    stream_time.checked_sub(retention).map_or(0, |base| base + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_merges_overlapping_sessions() {
        let mut model = ReferenceModel::new(1_000);
        model.put("a", 0, 5, 1, None);
        assert_eq!(model.put("a", 5, 8, 2, None), Some((0, 8)));
        assert_eq!(model.all(), vec![("a".to_string(), 0, 8, 2)]);
    }

    #[test]
    fn model_drops_expired() {
        let mut model = ReferenceModel::new(1_000);
        model.put("a", 0, 5, 1, None);
        model.put("b", 0, 2_000, 2, None);
        assert_eq!(model.horizon(), 1_001);
        assert_eq!(model.put("a", 0, 10, 3, None), None);
        assert_eq!(model.all(), vec![("b".to_string(), 0, 2_000, 2)]);
    }

    #[test]
    fn model_position_ignores_missed_removes() {
        let mut model = ReferenceModel::new(1_000);
        model.put("a", 0, 5, 1, Some(&RecordContext::new("t", 0, 3)));
        assert!(!model.remove("a", 0, 4, Some(&RecordContext::new("t", 0, 9))));
        assert_eq!(model.position().offset("t", 0), Some(3));
    }
}
