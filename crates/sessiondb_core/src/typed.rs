//! Typed facade over a byte-oriented session store.
//!
//! Keys and values are converted with a [`Codec`]. Range queries follow the
//! byte order of encoded keys, so key codecs should be order-preserving; all
//! codecs provided here are.

use crate::error::{CoreError, CoreResult};
use crate::iterator::SessionIterator;
use crate::position::RecordContext;
use crate::store::{PutOutcome, SessionStore};
use crate::types::Timestamp;
use crate::window::{SessionWindow, Windowed};
use std::marker::PhantomData;

/// Conversion between a type and its stored bytes.
pub trait Codec: Sized {
    /// Encodes the value.
    fn encode(&self) -> Vec<u8>;

    /// Decodes a value.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Corruption`] if the bytes are not a valid encoding.
    fn decode(bytes: &[u8]) -> CoreResult<Self>;
}

impl Codec for Vec<u8> {
    fn encode(&self) -> Vec<u8> {
        self.clone()
    }

    fn decode(bytes: &[u8]) -> CoreResult<Self> {
        Ok(bytes.to_vec())
    }
}

impl Codec for String {
    fn encode(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> CoreResult<Self> {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| CoreError::corruption(format!("invalid UTF-8: {e}")))
    }
}

impl Codec for u64 {
    fn encode(&self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> CoreResult<Self> {
        let array: [u8; 8] = bytes
            .try_into()
            .map_err(|_| CoreError::corruption("expected 8 bytes for u64"))?;
        Ok(u64::from_be_bytes(array))
    }
}

/// Big-endian with the sign bit flipped, so negative numbers sort first.
impl Codec for i64 {
    fn encode(&self) -> Vec<u8> {
        ((*self as u64) ^ (1 << 63)).to_be_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> CoreResult<Self> {
        let raw = u64::decode(bytes)?;
        Ok((raw ^ (1 << 63)) as i64)
    }
}

/// A session store speaking `K` keys and `V` values.
pub struct TypedSessionStore<K, V, S> {
    inner: S,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K: Codec, V: Codec, S: SessionStore> TypedSessionStore<K, V, S> {
    /// Wraps `inner`.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns the wrapped store mutably.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Unwraps the store.
    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Writes a session, merging it with overlapping sessions of `key`.
    pub fn put(
        &mut self,
        key: &K,
        window: SessionWindow,
        value: &V,
        context: Option<&RecordContext>,
    ) -> CoreResult<PutOutcome> {
        let session = Windowed::new(key.encode(), window);
        self.inner.put(&session, &value.encode(), context)
    }

    /// Deletes exactly this session. Returns true if it existed.
    pub fn remove(
        &mut self,
        key: &K,
        window: SessionWindow,
        context: Option<&RecordContext>,
    ) -> CoreResult<bool> {
        let session = Windowed::new(key.encode(), window);
        Ok(!self.inner.remove(&session, context)?.is_empty())
    }

    /// Returns the value of the session with exactly this window.
    pub fn fetch_session(&self, key: &K, start: Timestamp, end: Timestamp) -> CoreResult<Option<V>> {
        self.inner
            .fetch_session(&key.encode(), start, end)?
            .map(|bytes| V::decode(&bytes))
            .transpose()
    }

    /// Returns sessions of `key`, oldest first.
    pub fn find_sessions(
        &self,
        key: &K,
        earliest_end: Timestamp,
        latest_start: Timestamp,
    ) -> CoreResult<TypedSessionIterator<K, V>> {
        self.inner
            .find_sessions(&key.encode(), earliest_end, latest_start)
            .map(TypedSessionIterator::new)
    }

    /// Returns sessions of `key`, newest first.
    pub fn backward_find_sessions(
        &self,
        key: &K,
        earliest_end: Timestamp,
        latest_start: Timestamp,
    ) -> CoreResult<TypedSessionIterator<K, V>> {
        self.inner
            .backward_find_sessions(&key.encode(), earliest_end, latest_start)
            .map(TypedSessionIterator::new)
    }

    /// Returns sessions of keys in `[key_from, key_to]`.
    pub fn find_session_range(
        &self,
        key_from: Option<&K>,
        key_to: Option<&K>,
        earliest_end: Timestamp,
        latest_start: Timestamp,
    ) -> CoreResult<TypedSessionIterator<K, V>> {
        let from = key_from.map(Codec::encode);
        let to = key_to.map(Codec::encode);
        self.inner
            .find_session_range(from.as_deref(), to.as_deref(), earliest_end, latest_start)
            .map(TypedSessionIterator::new)
    }

    /// Returns every live session of `key`, oldest first.
    pub fn fetch(&self, key: &K) -> CoreResult<TypedSessionIterator<K, V>> {
        self.find_sessions(key, 0, Timestamp::MAX)
    }

    /// Returns every live session of `key`, newest first.
    pub fn backward_fetch(&self, key: &K) -> CoreResult<TypedSessionIterator<K, V>> {
        self.backward_find_sessions(key, 0, Timestamp::MAX)
    }
}

/// Iterator decoding the rows of a [`SessionIterator`].
pub struct TypedSessionIterator<K, V> {
    inner: SessionIterator,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> TypedSessionIterator<K, V> {
    fn new(inner: SessionIterator) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    /// Releases the underlying iterator.
    pub fn close(self) {
        self.inner.close();
    }
}

impl<K: Codec, V: Codec> Iterator for TypedSessionIterator<K, V> {
    type Item = CoreResult<(Windowed<K>, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.inner.next()?;
        Some(entry.and_then(|(windowed, value)| {
            let windowed = windowed.try_map_key(|key| K::decode(&key))?;
            Ok((windowed, V::decode(&value)?))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::store::SegmentedSessionStore;
    use proptest::prelude::*;
    use std::time::Duration;

    fn typed() -> TypedSessionStore<String, u64, SegmentedSessionStore> {
        let config = StoreConfig::new("typed", Duration::from_secs(10));
        TypedSessionStore::new(SegmentedSessionStore::open_in_memory(config).unwrap())
    }

    fn w(start: u64, end: u64) -> SessionWindow {
        SessionWindow::new(start, end).unwrap()
    }

    #[test]
    fn typed_round_trip() {
        let mut store = typed();
        store.put(&"user".to_string(), w(0, 5), &42, None).unwrap();

        assert_eq!(store.fetch_session(&"user".to_string(), 0, 5).unwrap(), Some(42));
        let rows: Vec<_> = store
            .fetch(&"user".to_string())
            .unwrap()
            .collect::<CoreResult<_>>()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0.key(), "user");
        assert_eq!(rows[0].1, 42);
    }

    #[test]
    fn typed_remove() {
        let mut store = typed();
        let key = "k".to_string();
        store.put(&key, w(0, 5), &1, None).unwrap();
        assert!(!store.remove(&key, w(0, 4), None).unwrap());
        assert!(store.remove(&key, w(0, 5), None).unwrap());
    }

    #[test]
    fn typed_range_follows_string_order() {
        let mut store = typed();
        for (i, key) in ["b", "a", "c"].iter().enumerate() {
            store.put(&(*key).to_string(), w(0, 1), &(i as u64), None).unwrap();
        }
        let keys: Vec<String> = store
            .find_session_range(Some(&"a".to_string()), Some(&"b".to_string()), 0, u64::MAX)
            .unwrap()
            .map(|r| r.unwrap().0.into_parts().0)
            .collect();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn invalid_utf8_is_corruption() {
        assert!(matches!(
            String::decode(&[0xFF, 0xFE]),
            Err(CoreError::Corruption { .. })
        ));
        assert!(u64::decode(&[1, 2]).is_err());
    }

    proptest! {
        #[test]
        fn i64_encoding_preserves_order(a in any::<i64>(), b in any::<i64>()) {
            prop_assert_eq!(a.cmp(&b), a.encode().cmp(&b.encode()));
            prop_assert_eq!(i64::decode(&a.encode()).unwrap(), a);
        }

        #[test]
        fn u64_encoding_preserves_order(a in any::<u64>(), b in any::<u64>()) {
            prop_assert_eq!(a.cmp(&b), a.encode().cmp(&b.encode()));
        }
    }
}
