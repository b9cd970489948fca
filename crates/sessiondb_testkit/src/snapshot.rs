//! Comparable snapshots of store contents.
//!
//! A snapshot captures every live session, the observed stream time and the
//! position of a store. Snapshots of a store before and after a restart, or
//! of a store and the reference model, must be equal.
//!
//! Snapshots serialize to JSON for readable assertion failures and for
//! golden files.

use crate::model::ReferenceModel;
use serde::{Deserialize, Serialize};
use sessiondb_core::{CoreResult, Position, SessionStore};

/// One stored session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRow {
    /// Key bytes.
    pub key: Vec<u8>,
    /// Window start.
    pub start: u64,
    /// Window end.
    pub end: u64,
    /// Value bytes.
    pub value: Vec<u8>,
}

/// Live contents of a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Observed stream time.
    pub observed_stream_time: u64,
    /// Live sessions in `(key, end, start)` order.
    pub sessions: Vec<SessionRow>,
    /// Committed position.
    pub position: Position,
}

impl StoreSnapshot {
    /// Captures the live contents of `store`.
    pub fn capture<S: SessionStore + ?Sized>(store: &S) -> CoreResult<Self> {
        let sessions = store
            .fetch_range(None, None)?
            .map(|entry| {
                let (windowed, value) = entry?;
                let window = windowed.window();
                Ok(SessionRow {
                    key: windowed.into_parts().0,
                    start: window.start(),
                    end: window.end(),
                    value,
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(Self {
            observed_stream_time: store.observed_stream_time(),
            sessions,
            position: store.position(),
        })
    }

    /// Builds the snapshot the reference model predicts. Values are encoded
    /// with [`crate::fixtures::value`].
    pub fn from_model(model: &ReferenceModel) -> Self {
        let sessions = model
            .all()
            .into_iter()
            .map(|(key, start, end, value)| SessionRow {
                key: key.into_bytes(),
                start,
                end,
                value: crate::fixtures::value(value),
            })
            .collect();
        Self {
            observed_stream_time: model.observed_stream_time(),
            sessions,
            position: model.position().clone(),
        }
    }

    /// Serializes the snapshot as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Parses a snapshot from JSON.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
