//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The log is corrupted before its final record.
    #[error("log corrupted at byte {offset}: {message}")]
    Corrupted {
        /// Byte offset of the damaged frame.
        offset: u64,
        /// Description of the damage.
        message: String,
    },

    /// A record is larger than a frame can describe.
    #[error("record of {len} bytes exceeds the frame limit")]
    RecordTooLarge {
        /// Length of the rejected record.
        len: usize,
    },

    /// The backend refused the write.
    #[error("write rejected: {0}")]
    WriteRejected(String),

    /// An earlier failed append could not be rolled back.
    ///
    /// Appends are refused until the log is truncated or rewritten.
    #[error("log has an unrecovered partial write")]
    Poisoned,

    /// The storage is closed.
    #[error("storage is closed")]
    Closed,
}

impl StorageError {
    /// Creates a corruption error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            message: message.into(),
        }
    }
}
