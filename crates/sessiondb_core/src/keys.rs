//! Physical key schema.
//!
//! Every store uses one backend, split into namespaces by the leading byte:
//!
//! ```text
//! 0x00 | name                                            metadata
//! 0x01 | segment (8) | escaped key | end (8) | start (8)  primary sessions
//! 0x02 | segment (8) | end (8) | escaped key | start (8)  time-ordered index
//! ```
//!
//! Integers are big-endian. Application keys are escaped so that the encoding
//! is prefix-free and order-preserving: `0x00` becomes `0x00 0xFF`, and the key
//! is terminated by `0x00 0x01`. Byte order of a physical key therefore equals
//! the logical order `(segment, key, end, start)` or `(segment, end, key, start)`.

use crate::error::{CoreError, CoreResult};
use crate::types::SegmentId;
use crate::window::SessionWindow;

pub(crate) const NS_SESSION: u8 = 0x01;
pub(crate) const NS_TIME_INDEX: u8 = 0x02;

pub(crate) const META_MANIFEST: &[u8] = b"\x00manifest";
pub(crate) const META_STREAM_TIME: &[u8] = b"\x00stream_time";
pub(crate) const META_POSITION: &[u8] = b"\x00position";
pub(crate) const META_SEGMENT_PREFIX: &[u8] = b"\x00segment/";

/// namespace (1) + segment id (8)
pub(crate) const SEGMENT_PREFIX_LEN: usize = 9;

const ESCAPE: u8 = 0x00;
const ESCAPED_ZERO: u8 = 0xFF;
const TERMINATOR: u8 = 0x01;

/// Which physical layout a key uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyLayout {
    /// `segment | key | end | start`
    KeyFirst,
    /// `segment | end | key | start`
    TimeFirst,
}

impl KeyLayout {
    pub(crate) const fn namespace(self) -> u8 {
        match self {
            Self::KeyFirst => NS_SESSION,
            Self::TimeFirst => NS_TIME_INDEX,
        }
    }
}

/// Appends the escaped form of `key` to `buf`.
pub(crate) fn escape_into(buf: &mut Vec<u8>, key: &[u8]) {
    for &b in key {
        buf.push(b);
        if b == ESCAPE {
            buf.push(ESCAPED_ZERO);
        }
    }
    buf.push(ESCAPE);
    buf.push(TERMINATOR);
}

/// Reads an escaped key from the front of `data`.
///
/// Returns the key and the number of bytes consumed.
pub(crate) fn unescape(data: &[u8]) -> CoreResult<(Vec<u8>, usize)> {
    let mut key = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        let b = data[i];
        if b != ESCAPE {
            key.push(b);
            i += 1;
            continue;
        }
        match data.get(i + 1) {
            Some(&ESCAPED_ZERO) => {
                key.push(ESCAPE);
                i += 2;
            }
            Some(&TERMINATOR) => return Ok((key, i + 2)),
            _ => return Err(CoreError::corruption("malformed key escape sequence")),
        }
    }
    Err(CoreError::corruption("unterminated key"))
}

/// Returns `namespace | segment`.
pub(crate) fn segment_prefix(layout: KeyLayout, segment: SegmentId) -> Vec<u8> {
    let mut buf = Vec::with_capacity(SEGMENT_PREFIX_LEN);
    buf.push(layout.namespace());
    buf.extend_from_slice(&segment.as_u64().to_be_bytes());
    buf
}

/// Returns the primary prefix shared by all sessions of `key` in `segment`.
pub(crate) fn key_prefix(segment: SegmentId, key: &[u8]) -> Vec<u8> {
    let mut buf = segment_prefix(KeyLayout::KeyFirst, segment);
    escape_into(&mut buf, key);
    buf
}

/// Encodes the primary key of a session.
pub(crate) fn session_key(segment: SegmentId, key: &[u8], window: SessionWindow) -> Vec<u8> {
    let mut buf = key_prefix(segment, key);
    buf.extend_from_slice(&window.end().to_be_bytes());
    buf.extend_from_slice(&window.start().to_be_bytes());
    buf
}

/// Encodes the time-index key of a session.
pub(crate) fn time_index_key(segment: SegmentId, key: &[u8], window: SessionWindow) -> Vec<u8> {
    let mut buf = segment_prefix(KeyLayout::TimeFirst, segment);
    buf.extend_from_slice(&window.end().to_be_bytes());
    escape_into(&mut buf, key);
    buf.extend_from_slice(&window.start().to_be_bytes());
    buf
}

/// A decoded physical session key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DecodedKey {
    pub segment: SegmentId,
    pub key: Vec<u8>,
    pub window: SessionWindow,
}

/// Decodes a primary or time-index key.
pub(crate) fn decode(layout: KeyLayout, data: &[u8]) -> CoreResult<DecodedKey> {
    if data.len() < SEGMENT_PREFIX_LEN + 2 + 16 || data[0] != layout.namespace() {
        return Err(CoreError::corruption("session key too short or wrong namespace"));
    }
    let segment = SegmentId::new(read_u64(&data[1..SEGMENT_PREFIX_LEN]));
    let body = &data[SEGMENT_PREFIX_LEN..];

    let (key, end, start) = match layout {
        KeyLayout::KeyFirst => {
            let (key, used) = unescape(body)?;
            let rest = &body[used..];
            if rest.len() != 16 {
                return Err(CoreError::corruption("session key has trailing bytes"));
            }
            (key, read_u64(&rest[..8]), read_u64(&rest[8..]))
        }
        KeyLayout::TimeFirst => {
            let end = read_u64(&body[..8]);
            let (key, used) = unescape(&body[8..])?;
            let rest = &body[8 + used..];
            if rest.len() != 8 {
                return Err(CoreError::corruption("index key has trailing bytes"));
            }
            (key, end, read_u64(rest))
        }
    };

    let window = SessionWindow::new(start, end)
        .map_err(|_| CoreError::corruption("stored window has start after end"))?;
    Ok(DecodedKey {
        segment,
        key,
        window,
    })
}

/// Returns the key of the marker recording that `segment` exists.
pub(crate) fn segment_marker_key(segment: SegmentId) -> Vec<u8> {
    let mut buf = META_SEGMENT_PREFIX.to_vec();
    buf.extend_from_slice(&segment.as_u64().to_be_bytes());
    buf
}

/// Decodes a segment marker key.
pub(crate) fn decode_segment_marker(data: &[u8]) -> CoreResult<SegmentId> {
    let id = data
        .strip_prefix(META_SEGMENT_PREFIX)
        .filter(|rest| rest.len() == 8)
        .ok_or_else(|| CoreError::corruption("malformed segment marker"))?;
    Ok(SegmentId::new(read_u64(id)))
}

/// Returns the smallest byte string greater than every string starting with `prefix`.
///
/// Returns `None` when no such string exists (`prefix` is all `0xFF`).
pub(crate) fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let pos = prefix.iter().rposition(|&b| b != 0xFF)?;
    let mut succ = prefix[..=pos].to_vec();
    succ[pos] += 1;
    Some(succ)
}

/// Successor of a prefix that begins with a namespace byte.
///
/// Namespace bytes are never `0xFF`, so the successor always exists.
pub(crate) fn namespaced_successor(prefix: &[u8]) -> Vec<u8> {
    prefix_successor(prefix).unwrap_or_else(|| vec![0xFF; prefix.len() + 1])
}

pub(crate) fn encode_u64(value: u64) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

pub(crate) fn decode_u64(data: &[u8]) -> CoreResult<u64> {
    if data.len() != 8 {
        return Err(CoreError::corruption("expected 8 bytes for u64"));
    }
    Ok(read_u64(data))
}

fn read_u64(data: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[..8]);
    u64::from_be_bytes(buf)
}
