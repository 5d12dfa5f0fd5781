//! Transaction state.

use serde_json::Value;

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can accept operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted.
    Aborted,
}

impl TransactionState {
    /// Returns the state name used in error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TransactionState::Active => "active",
            TransactionState::Committed => "committed",
            TransactionState::Aborted => "aborted",
        }
    }
}

/// Represents a pending write in a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingWrite {
    /// Insert or replace a record.
    Put(Value),
    /// Delete a record.
    Delete,
}

impl PendingWrite {
    /// Returns the value the write leaves behind, if any.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            PendingWrite::Put(value) => Some(value),
            PendingWrite::Delete => None,
        }
    }
}
