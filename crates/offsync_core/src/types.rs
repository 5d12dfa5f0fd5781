//! Core type definitions.

use offsync_sync_protocol::RecordId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the record field holding the record's key.
pub const KEY_PATH: &str = "id";

/// Key of a record within a store.
///
/// Collection stores key records by their id. The change log keys its
/// entries by the compound (collection, id) so that equal ids in different
/// collections never collide.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Key {
    /// A plain record id.
    Id(RecordId),
    /// A (collection, id) pair.
    Compound(String, RecordId),
}

impl Key {
    /// Creates a compound key.
    pub fn compound(collection: impl Into<String>, id: RecordId) -> Self {
        Self::Compound(collection.into(), id)
    }

    /// Returns the record id part of the key.
    #[must_use]
    pub fn id(&self) -> &RecordId {
        match self {
            Key::Id(id) | Key::Compound(_, id) => id,
        }
    }
}

impl From<RecordId> for Key {
    fn from(id: RecordId) -> Self {
        Self::Id(id)
    }
}

impl From<&RecordId> for Key {
    fn from(id: &RecordId) -> Self {
        Self::Id(id.clone())
    }
}

impl From<&str> for Key {
    fn from(id: &str) -> Self {
        Self::Id(RecordId::from(id))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Id(id) => write!(f, "{id}"),
            Key::Compound(collection, id) => write!(f, "{collection}/{id}"),
        }
    }
}

/// Unique identifier for a transaction.
///
/// Transaction IDs are monotonically increasing within one open database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Only reads are allowed.
    ReadOnly,
    /// Reads and writes are allowed.
    ReadWrite,
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionMode::ReadOnly => f.write_str("readonly"),
            TransactionMode::ReadWrite => f.write_str("readwrite"),
        }
    }
}
