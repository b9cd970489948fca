//! Value policy for merged sessions.
//!
//! When a put overlaps existing sessions of the same key, the engine folds the
//! values of every merged session, oldest window first, and finally the
//! incoming value:
//!
//! ```text
//! aggregate = v1
//! aggregate = merger.merge(key, aggregate, v2)
//! ...
//! aggregate = merger.merge(key, aggregate, incoming)
//! ```

/// Combines the values of sessions that are merged into one.
pub trait SessionMerger: Send + Sync {
    /// Folds `next` into `aggregate`.
    fn merge(&self, key: &[u8], aggregate: &[u8], next: &[u8]) -> Vec<u8>;
}

/// Keeps the most recent value.
///
/// Suits callers that aggregate on their side and always write the full value
/// of the session they computed.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestValueMerger;

impl SessionMerger for LatestValueMerger {
    fn merge(&self, _key: &[u8], _aggregate: &[u8], next: &[u8]) -> Vec<u8> {
        next.to_vec()
    }
}

impl<F> SessionMerger for F
where
    F: Fn(&[u8], &[u8], &[u8]) -> Vec<u8> + Send + Sync,
{
    fn merge(&self, key: &[u8], aggregate: &[u8], next: &[u8]) -> Vec<u8> {
        self(key, aggregate, next)
    }
}

/// Folds `values` in order, returning `None` for an empty input.
pub(crate) fn fold_values<'a, I>(merger: &dyn SessionMerger, key: &[u8], values: I) -> Option<Vec<u8>>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut values = values.into_iter();
    let first = values.next()?.to_vec();
    Some(values.fold(first, |aggregate, next| merger.merge(key, &aggregate, next)))
}
