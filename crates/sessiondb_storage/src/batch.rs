//! Atomic write batches and their log encoding.
//!
//! ## Batch Encoding
//!
//! ```text
//! | op_count (4) | op* |
//! op = | tag (1) | key_len (4) | key | value_len (4) | value |   tag 1 = put
//!      | tag (1) | key_len (4) | key |                           tag 2 = delete
//!      | tag (1) | start_len (4) | start | end_len (4) | end |   tag 3 = delete range
//! ```
//!
//! All integers are little-endian. Encoding fails with
//! [`StorageError::TooLarge`] rather than truncating a length that does not
//! fit its field.

use crate::error::{StorageError, StorageResult};
use std::collections::BTreeMap;

const TAG_PUT: u8 = 1;
const TAG_DELETE: u8 = 2;
const TAG_DELETE_RANGE: u8 = 3;

/// A single operation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Store a value under a key.
    Put {
        /// Key to write.
        key: Vec<u8>,
        /// Value to store.
        value: Vec<u8>,
    },
    /// Remove a key.
    Delete {
        /// Key to remove.
        key: Vec<u8>,
    },
    /// Remove every key in `[start, end)`.
    DeleteRange {
        /// Inclusive lower bound.
        start: Vec<u8>,
        /// Exclusive upper bound.
        end: Vec<u8>,
    },
}

/// An ordered group of operations applied atomically by a backend.
///
/// Operations are applied in insertion order, so a `Put` after a `DeleteRange`
/// covering the same key survives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a put.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Put {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Queues a delete.
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Delete { key: key.into() });
        self
    }

    /// Queues a range delete over `[start, end)`.
    pub fn delete_range(
        &mut self,
        start: impl Into<Vec<u8>>,
        end: impl Into<Vec<u8>>,
    ) -> &mut Self {
        self.ops.push(BatchOp::DeleteRange {
            start: start.into(),
            end: end.into(),
        });
        self
    }

    /// Returns the queued operations.
    #[must_use]
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Returns the number of queued operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Checks that every range op has `start <= end`.
    pub fn validate(&self) -> StorageResult<()> {
        for op in &self.ops {
            if let BatchOp::DeleteRange { start, end } = op {
                if start > end {
                    return Err(StorageError::InvalidRange {
                        start: start.clone(),
                        end: end.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Applies the batch to an ordered map.
    pub(crate) fn apply_to(self, map: &mut BTreeMap<Vec<u8>, Vec<u8>>) {
        for op in self.ops {
            match op {
                BatchOp::Put { key, value } => {
                    map.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    map.remove(&key);
                }
                BatchOp::DeleteRange { start, end } => {
                    if start >= end {
                        continue;
                    }
                    let mut tail = map.split_off(start.as_slice());
                    let mut kept = tail.split_off(end.as_slice());
                    map.append(&mut kept);
                }
            }
        }
    }

    /// Encodes the batch to bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::TooLarge`] if the op count or any key or value
    /// length exceeds `u32::MAX`.
    pub fn encode(&self) -> StorageResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&length_field(self.ops.len())?);

        for op in &self.ops {
            match op {
                BatchOp::Put { key, value } => {
                    buf.push(TAG_PUT);
                    put_bytes(&mut buf, key)?;
                    put_bytes(&mut buf, value)?;
                }
                BatchOp::Delete { key } => {
                    buf.push(TAG_DELETE);
                    put_bytes(&mut buf, key)?;
                }
                BatchOp::DeleteRange { start, end } => {
                    buf.push(TAG_DELETE_RANGE);
                    put_bytes(&mut buf, start)?;
                    put_bytes(&mut buf, end)?;
                }
            }
        }

        Ok(buf)
    }

    /// Decodes a batch from bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Corrupted`] if the bytes are truncated, carry an
    /// unknown tag, or have trailing garbage.
    pub fn decode(data: &[u8]) -> StorageResult<Self> {
        let mut reader = Reader { data, pos: 0 };
        let count = reader.u32()? as usize;
        let mut ops = Vec::with_capacity(count.min(4096));

        for _ in 0..count {
            let op = match reader.u8()? {
                TAG_PUT => BatchOp::Put {
                    key: reader.bytes()?,
                    value: reader.bytes()?,
                },
                TAG_DELETE => BatchOp::Delete {
                    key: reader.bytes()?,
                },
                TAG_DELETE_RANGE => BatchOp::DeleteRange {
                    start: reader.bytes()?,
                    end: reader.bytes()?,
                },
                tag => {
                    return Err(StorageError::corrupted(format!(
                        "unknown batch op tag {tag}"
                    )))
                }
            };
            ops.push(op);
        }

        if reader.pos != data.len() {
            return Err(StorageError::corrupted("trailing bytes after batch"));
        }

        Ok(Self { ops })
    }

    fn encoded_len(&self) -> usize {
        4 + self
            .ops
            .iter()
            .map(|op| match op {
                BatchOp::Put { key, value } => 9 + key.len() + value.len(),
                BatchOp::Delete { key } => 5 + key.len(),
                BatchOp::DeleteRange { start, end } => 9 + start.len() + end.len(),
            })
            .sum::<usize>()
    }
}

/// Encodes `len` as a little-endian `u32` length field.
pub(crate) fn length_field(len: usize) -> StorageResult<[u8; 4]> {
    u32::try_from(len)
        .map(u32::to_le_bytes)
        .map_err(|_| StorageError::TooLarge { len })
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> StorageResult<()> {
    buf.extend_from_slice(&length_field(bytes.len())?);
    buf.extend_from_slice(bytes);
    Ok(())
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take(&mut self, len: usize) -> StorageResult<&[u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| StorageError::corrupted("batch truncated"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> StorageResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> StorageResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn bytes(&mut self) -> StorageResult<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encode_decode_mixed_batch() {
        let mut batch = WriteBatch::new();
        batch
            .put(b"a".to_vec(), b"1".to_vec())
            .delete(b"b".to_vec())
            .delete_range(b"c".to_vec(), b"d".to_vec());

        let decoded = WriteBatch::decode(&batch.encode().unwrap()).unwrap();
        assert_eq!(decoded, batch);
    }

    #[test]
    fn decode_truncated_fails() {
        let mut batch = WriteBatch::new();
        batch.put(b"key".to_vec(), b"value".to_vec());
        let encoded = batch.encode().unwrap();

        let result = WriteBatch::decode(&encoded[..encoded.len() - 2]);
        assert!(matches!(result, Err(StorageError::Corrupted(_))));
    }

    #[test]
    fn decode_unknown_tag_fails() {
        let data = [1, 0, 0, 0, 9];
        assert!(WriteBatch::decode(&data).is_err());
    }

    #[test]
    fn apply_in_order() {
        let mut map = BTreeMap::new();
        map.insert(b"a1".to_vec(), b"x".to_vec());
        map.insert(b"a2".to_vec(), b"x".to_vec());
        map.insert(b"b1".to_vec(), b"x".to_vec());

        let mut batch = WriteBatch::new();
        batch
            .delete_range(b"a".to_vec(), b"b".to_vec())
            .put(b"a2".to_vec(), b"y".to_vec());
        batch.apply_to(&mut map);

        let keys: Vec<_> = map.keys().cloned().collect();
        assert_eq!(keys, vec![b"a2".to_vec(), b"b1".to_vec()]);
        assert_eq!(map.get(b"a2".as_slice()), Some(&b"y".to_vec()));
    }

    #[test]
    fn validate_rejects_inverted_range() {
        let mut batch = WriteBatch::new();
        batch.delete_range(b"z".to_vec(), b"a".to_vec());
        assert!(matches!(
            batch.validate(),
            Err(StorageError::InvalidRange { .. })
        ));
    }

    #[test]
    fn length_field_fits_u32() {
        assert_eq!(length_field(0).unwrap(), [0; 4]);
        assert_eq!(length_field(u32::MAX as usize).unwrap(), [0xFF; 4]);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn length_field_rejects_oversized_lengths() {
        let len = u32::MAX as usize + 1;
        assert!(matches!(
            length_field(len),
            Err(StorageError::TooLarge { len: l }) if l == len
        ));
    }

    fn op_strategy() -> impl Strategy<Value = BatchOp> {
        let bytes = || prop::collection::vec(any::<u8>(), 0..6);
        prop_oneof![
            (bytes(), bytes()).prop_map(|(key, value)| BatchOp::Put { key, value }),
            bytes().prop_map(|key| BatchOp::Delete { key }),
            (bytes(), bytes()).prop_map(|(a, b)| {
                let (start, end) = if a <= b { (a, b) } else { (b, a) };
                BatchOp::DeleteRange { start, end }
            }),
        ]
    }

    fn apply_naively(ops: &[BatchOp], map: &mut BTreeMap<Vec<u8>, Vec<u8>>) {
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    map.insert(key.clone(), value.clone());
                }
                BatchOp::Delete { key } => {
                    map.remove(key);
                }
                BatchOp::DeleteRange { start, end } => {
                    map.retain(|key, _| key < start || key >= end);
                }
            }
        }
    }

    proptest! {
        #[test]
        fn decoded_batch_applies_like_ops_in_order(
            ops in prop::collection::vec(op_strategy(), 0..24),
        ) {
            let batch = WriteBatch { ops: ops.clone() };
            let decoded = WriteBatch::decode(&batch.encode().unwrap()).unwrap();
            prop_assert_eq!(&decoded, &batch);

            let mut expected = BTreeMap::new();
            apply_naively(&ops, &mut expected);
            let mut actual = BTreeMap::new();
            decoded.apply_to(&mut actual);
            prop_assert_eq!(actual, expected);
        }
    }
}
