//! Error types for offsync core.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in offsync core operations.
///
/// The storage-boundary conditions (`StoreNotFound`, `InvalidKey`,
/// `DataClone`, `TransactionInactive`) are kept as distinct variants so that
/// callers can tell them apart without parsing messages.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] offsync_storage::StorageError),

    /// A commit-log record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON error while reading or writing local state.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The caller passed an argument the operation cannot accept.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// The key of a record is missing or not a valid key.
    #[error("invalid key for store {store}: {message}")]
    InvalidKey {
        /// Store the write targeted.
        store: String,
        /// Description of the problem.
        message: String,
    },

    /// The value cannot be stored.
    #[error("value cannot be stored in {store}: {message}")]
    DataClone {
        /// Store the write targeted.
        store: String,
        /// Description of the problem.
        message: String,
    },

    /// The store does not exist or is not in the transaction's scope.
    #[error("store not found: {name}")]
    StoreNotFound {
        /// Name of the store.
        name: String,
    },

    /// The transaction was already committed or aborted.
    #[error("transaction inactive: {state}")]
    TransactionInactive {
        /// State the transaction was sealed in.
        state: &'static str,
    },

    /// A write was attempted in a read-only transaction.
    #[error("read-only transaction cannot write to {store}")]
    ReadOnly {
        /// Store the write targeted.
        store: String,
    },

    /// Transaction was aborted.
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Reason for abort.
        reason: String,
    },

    /// Collection not found.
    #[error("collection not found: {name}")]
    CollectionNotFound {
        /// Name of the collection.
        name: String,
    },

    /// No database exists at the path and creation was disabled.
    #[error("database not found: {}", path.display())]
    DatabaseNotFound {
        /// Expected location of the database log.
        path: PathBuf,
    },

    /// Another handle holds the database lock.
    #[error("database is locked: {}", path.display())]
    DatabaseLocked {
        /// The lock file.
        path: PathBuf,
    },
}

impl CoreError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid key error.
    pub fn invalid_key(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidKey {
            store: store.into(),
            message: message.into(),
        }
    }

    /// Creates a data clone error.
    pub fn data_clone(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DataClone {
            store: store.into(),
            message: message.into(),
        }
    }

    /// Creates a store-not-found error.
    pub fn store_not_found(name: impl Into<String>) -> Self {
        Self::StoreNotFound { name: name.into() }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec(message.into())
    }

    /// Returns true for errors raised by the store or its storage layer,
    /// as opposed to errors in the caller's arguments.
    #[must_use]
    pub fn is_storage(&self) -> bool {
        !matches!(self, Self::InvalidArgument { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_conditions_are_distinct() {
        let errors = [
            CoreError::store_not_found("todos"),
            CoreError::invalid_key("todos", "missing id"),
            CoreError::data_clone("todos", "not an object"),
            CoreError::TransactionInactive { state: "committed" },
        ];
        let messages: Vec<_> = errors.iter().map(ToString::to_string).collect();
        assert_eq!(messages[0], "store not found: todos");
        assert_eq!(messages[1], "invalid key for store todos: missing id");
        assert_eq!(messages[3], "transaction inactive: committed");
        assert!(errors.iter().all(CoreError::is_storage));
    }

    #[test]
    fn invalid_argument_is_not_storage() {
        assert!(!CoreError::invalid_argument("data is undefined").is_storage());
    }
}
