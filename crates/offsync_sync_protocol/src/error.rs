//! Error types for protocol encoding and decoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The message is not valid JSON or does not have the expected shape.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A change entry carries an operation code this client does not know.
    #[error("unknown operation {operation:?} for record {id} in {collection}")]
    UnknownOperation {
        /// The operation code as received.
        operation: String,
        /// Target collection.
        collection: String,
        /// Target record.
        id: String,
    },

    /// An UPDATE entry arrived without a change set.
    #[error("UPDATE for record {id} in {collection} has no changeSet")]
    MissingChangeSet {
        /// Target collection.
        collection: String,
        /// Target record.
        id: String,
    },
}
