//! Benchmark utilities.

use rand::Rng;
use sessiondb_core::{SegmentedSessionStore, SessionStore, SessionWindow, StoreConfig, Windowed};
use std::time::Duration;

/// Retention used by the benchmark stores.
pub const RETENTION_MS: u64 = 60_000;

/// Generate random data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Key of the `i`th benchmark user.
pub fn user_key(i: usize) -> Vec<u8> {
    format!("user-{i:06}").into_bytes()
}

/// A windowed key, panicking on an inverted window.
pub fn session(key: Vec<u8>, start: u64, end: u64) -> Windowed<Vec<u8>> {
    let window = SessionWindow::new(start, end).expect("benchmark windows are ordered");
    Windowed::new(key, window)
}

/// Configuration for benchmark stores.
pub fn bench_config(with_index: bool) -> StoreConfig {
    StoreConfig::new("bench", Duration::from_millis(RETENTION_MS))
        .segment_interval(Duration::from_millis(RETENTION_MS / 4))
        .time_ordered_index(with_index)
        .sync_on_write(false)
}

/// Opens an in-memory store holding `users` keys with `per_user` disjoint
/// sessions each, spread across the retention period.
pub fn populated_store(users: usize, per_user: usize, with_index: bool) -> SegmentedSessionStore {
    let mut store =
        SegmentedSessionStore::open_in_memory(bench_config(with_index)).expect("open store");
    let step = RETENTION_MS / per_user.max(1) as u64;
    for n in 0..per_user {
        let start = n as u64 * step;
        for user in 0..users {
            store
                .put(&session(user_key(user), start, start + step / 2), &random_data(64), None)
                .expect("populate store");
        }
    }
    store
}
