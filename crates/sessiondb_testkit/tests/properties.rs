//! Property tests comparing the engine with the reference model.

use proptest::prelude::*;
use sessiondb_core::{RecordContext, SegmentedSessionStore, SessionStore};
use sessiondb_storage::{InMemoryBackend, KvBackend};
use sessiondb_testkit::prelude::*;
use std::sync::Arc;

const RETENTION: u64 = 200;
const INTERVAL: u64 = 100;
const MAX_TIME: u64 = 1_000;
const MAX_LEN: u64 = 40;

fn open(mode: IndexMode) -> SegmentedSessionStore {
    SegmentedSessionStore::open_in_memory(small_config(RETENTION, INTERVAL, mode)).unwrap()
}

fn context(offset: usize) -> RecordContext {
    RecordContext::new("input", 0, offset as u64)
}

fn ops() -> impl Strategy<Value = Vec<StoreOperation>> {
    operation_sequence_strategy(1, 60, MAX_TIME, MAX_LEN)
}

/// Every key [`key_strategy`] can produce.
fn all_keys() -> Vec<String> {
    let letters = ["a", "b", "c"];
    let mut keys: Vec<String> = letters.iter().map(|l| l.to_string()).collect();
    for first in letters {
        for second in letters {
            keys.push(format!("{first}{second}"));
        }
    }
    keys
}

fn mode() -> impl Strategy<Value = IndexMode> {
    prop_oneof![Just(IndexMode::WithoutIndex), Just(IndexMode::WithIndex)]
}

proptest! {
    #![proptest_config(PropTestConfig::default().to_proptest_config())]

    #[test]
    fn store_matches_model(ops in ops(), mode in mode()) {
        let mut store = open(mode);
        let mut model = ReferenceModel::new(RETENTION);
        for (i, op) in ops.iter().enumerate() {
            op.apply_to(&mut store, Some(&context(i))).unwrap();
            model.apply(op, Some(&context(i)));
        }
        prop_assert_eq!(
            StoreSnapshot::capture(&store).unwrap(),
            StoreSnapshot::from_model(&model)
        );
    }

    #[test]
    fn merged_sessions_never_touch(ops in ops(), mode in mode()) {
        let mut store = open(mode);
        for op in &ops {
            op.apply_to(&mut store, None).unwrap();
        }
        for key in all_keys() {
            let rows = rows(store.fetch(key.as_bytes()).unwrap()).unwrap();
            for pair in rows.windows(2) {
                // previous end strictly before next start, no overlap or adjacency
                prop_assert!(pair[0].2 < pair[1].1, "{:?}", pair);
            }
        }
    }

    #[test]
    fn stream_time_never_decreases(ops in ops()) {
        let mut store = open(IndexMode::WithoutIndex);
        let mut previous = store.observed_stream_time();
        for op in &ops {
            op.apply_to(&mut store, None).unwrap();
            let current = store.observed_stream_time();
            prop_assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn nothing_behind_horizon_is_visible(ops in ops(), mode in mode()) {
        let mut store = open(mode);
        for op in &ops {
            op.apply_to(&mut store, None).unwrap();
            let horizon = horizon_at(store.observed_stream_time(), RETENTION);

            for (key, start, end, _) in rows(store.fetch_range(None, None).unwrap()).unwrap() {
                prop_assert!(end >= horizon, "{} [{}, {}] behind {}", key, start, end, horizon);
            }
            for segment in store.directory().segments() {
                prop_assert!(segment.upper_bound() >= horizon);
            }
            if mode.enabled() {
                for (_, _, end, _) in rows(store.find_sessions_by_end_time(0, u64::MAX).unwrap()).unwrap() {
                    prop_assert!(end >= horizon);
                }
            }
        }
    }

    #[test]
    fn forward_and_backward_are_mirrors(
        ops in ops(),
        key in key_strategy(),
        (lo, hi) in window_strategy(MAX_TIME, 400),
    ) {
        let mut store = open(IndexMode::WithoutIndex);
        for op in &ops {
            op.apply_to(&mut store, None).unwrap();
        }

        let forward = rows(store.find_sessions(key.as_bytes(), lo, hi).unwrap()).unwrap();
        for pair in forward.windows(2) {
            prop_assert!((pair[0].1, pair[0].2) < (pair[1].1, pair[1].2));
        }
        let mut backward = rows(store.backward_find_sessions(key.as_bytes(), lo, hi).unwrap()).unwrap();
        backward.reverse();
        prop_assert_eq!(&backward, &forward);

        let range = rows(store.find_session_range(None, None, lo, hi).unwrap()).unwrap();
        for pair in range.windows(2) {
            prop_assert!((&pair[0].0, pair[0].2) < (&pair[1].0, pair[1].2));
        }
        let mut backward_range = rows(store.backward_find_session_range(None, None, lo, hi).unwrap()).unwrap();
        backward_range.reverse();
        prop_assert_eq!(backward_range, range);
    }

    #[test]
    fn end_time_scan_matches_model(ops in ops(), (lo, hi) in window_strategy(MAX_TIME, 400)) {
        let mut store = open(IndexMode::WithIndex);
        let mut model = ReferenceModel::new(RETENTION);
        for op in &ops {
            op.apply_to(&mut store, None).unwrap();
            model.apply(op, None);
        }
        let found = rows(store.find_sessions_by_end_time(lo, hi).unwrap()).unwrap();
        prop_assert_eq!(found, model.find_sessions_by_end_time(lo, hi));
    }

    #[test]
    fn position_never_decreases(ops in ops()) {
        let mut store = open(IndexMode::WithoutIndex);
        let mut previous = 0;
        for (i, op) in ops.iter().enumerate() {
            op.apply_to(&mut store, Some(&context(i))).unwrap();
            let current = store.position().offset("input", 0).unwrap_or(0);
            prop_assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn replay_after_crash_converges(ops in ops(), crash_at in 0usize..60) {
        let config = small_config(RETENTION, INTERVAL, IndexMode::WithIndex);

        let mut uninterrupted = SegmentedSessionStore::open_in_memory(config.clone()).unwrap();
        for (i, op) in ops.iter().enumerate() {
            op.apply_to(&mut uninterrupted, Some(&context(i))).unwrap();
        }

        let inner: Arc<dyn KvBackend> = Arc::new(InMemoryBackend::new());
        let crashable = Arc::new(CrashableBackend::new(Arc::clone(&inner)));
        let mut store = SegmentedSessionStore::open(config.clone(), crashable.clone()).unwrap();
        crashable.crash_after_writes(crash_at);
        for (i, op) in ops.iter().enumerate() {
            if op.apply_to(&mut store, Some(&context(i))).is_err() {
                break;
            }
        }
        drop(store);

        // restart and replay everything after the committed position
        let mut recovered = SegmentedSessionStore::open(config, inner).unwrap();
        let resume = recovered
            .position()
            .offset("input", 0)
            .map_or(0, |offset| offset as usize + 1);
        for (i, op) in ops.iter().enumerate().skip(resume) {
            op.apply_to(&mut recovered, Some(&context(i))).unwrap();
        }

        prop_assert_eq!(
            StoreSnapshot::capture(&recovered).unwrap(),
            StoreSnapshot::capture(&uninterrupted).unwrap()
        );
    }
}
