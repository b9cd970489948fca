//! Property-based test generators using proptest.
//!
//! Keys are drawn from a small alphabet so that generated operations collide
//! often enough to exercise merging.

use crate::fixtures::{session, value};
use proptest::prelude::*;
use sessiondb_core::{CoreResult, RecordContext, SessionStore};

/// Strategy for keys: one or two letters from `a..=c`.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-c]{1,2}").expect("Invalid regex")
}

/// Strategy for `(start, end)` pairs with `start <= end`.
///
/// Starts fall in `[0, max_time)`, lengths in `[0, max_len]`.
pub fn window_strategy(max_time: u64, max_len: u64) -> impl Strategy<Value = (u64, u64)> {
    (0..max_time, 0..=max_len).prop_map(|(start, len)| (start, start + len))
}

/// A generated store operation.
#[derive(Debug, Clone)]
pub enum StoreOperation {
    /// Put a session.
    Put {
        /// Session key.
        key: String,
        /// Window start.
        start: u64,
        /// Window end.
        end: u64,
        /// Value to store.
        value: u64,
    },
    /// Remove an exact session.
    Remove {
        /// Session key.
        key: String,
        /// Window start.
        start: u64,
        /// Window end.
        end: u64,
    },
}

impl StoreOperation {
    /// Returns the key the operation targets.
    pub fn key(&self) -> &str {
        match self {
            Self::Put { key, .. } | Self::Remove { key, .. } => key,
        }
    }

    /// Runs the operation against `store`.
    pub fn apply_to<S: SessionStore + ?Sized>(
        &self,
        store: &mut S,
        context: Option<&RecordContext>,
    ) -> CoreResult<()> {
        match self {
            Self::Put {
                key,
                start,
                end,
                value: v,
            } => {
                store.put(&session(key, *start, *end), &value(*v), context)?;
            }
            Self::Remove { key, start, end } => {
                store.remove(&session(key, *start, *end), context)?;
            }
        }
        Ok(())
    }
}

/// Strategy for single operations, mostly puts.
pub fn store_operation_strategy(max_time: u64, max_len: u64) -> impl Strategy<Value = StoreOperation> {
    prop_oneof![
        4 => (key_strategy(), window_strategy(max_time, max_len), any::<u64>())
            .prop_map(|(key, (start, end), value)| StoreOperation::Put { key, start, end, value }),
        1 => (key_strategy(), window_strategy(max_time, max_len))
            .prop_map(|(key, (start, end))| StoreOperation::Remove { key, start, end }),
    ]
}

/// Strategy for a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
    max_time: u64,
    max_len: u64,
) -> impl Strategy<Value = Vec<StoreOperation>> {
    prop::collection::vec(store_operation_strategy(max_time, max_len), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 128,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 200,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn windows_are_ordered((start, end) in window_strategy(1_000, 50)) {
            prop_assert!(start <= end);
            prop_assert!(end - start <= 50);
        }

        #[test]
        fn keys_use_small_alphabet(key in key_strategy()) {
            prop_assert!(!key.is_empty() && key.len() <= 2);
            prop_assert!(key.chars().all(|c| ('a'..='c').contains(&c)));
        }

        #[test]
        fn operations_target_generated_keys(op in store_operation_strategy(100, 10)) {
            prop_assert!(!op.key().is_empty());
        }
    }
}
