//! Commit-log records.
//!
//! Every committed transaction is appended to the storage backend as one
//! CBOR-encoded [`LogRecord`]. Opening a database replays the log in order.

use crate::error::{CoreError, CoreResult};
use crate::types::Key;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single write inside a committed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum LoggedWrite {
    /// Store `value` under `key`.
    Put {
        store: String,
        key: Key,
        value: Value,
    },
    /// Remove `key`.
    Delete { store: String, key: Key },
}

/// One record of the commit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum LogRecord {
    /// Stores created by `Database::open`.
    CreateStores { names: Vec<String> },
    /// The writes of one committed transaction.
    Commit { txn: u64, writes: Vec<LoggedWrite> },
    /// Full contents of every store, written by compaction.
    Snapshot {
        stores: Vec<(String, Vec<(Key, Value)>)>,
    },
}

impl LogRecord {
    pub(crate) fn encode(&self) -> CoreResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes).map_err(|e| CoreError::codec(e.to_string()))?;
        Ok(bytes)
    }

    pub(crate) fn decode(bytes: &[u8]) -> CoreResult<Self> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::codec(e.to_string()))
    }
}
