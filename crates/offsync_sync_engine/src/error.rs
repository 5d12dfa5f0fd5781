//! Error types for the sync engine.

use offsync_core::CoreError;
use offsync_sync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The caller passed an argument the operation cannot accept.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Local storage failed; the operation's transaction was aborted.
    #[error("storage error: {0}")]
    Storage(#[from] CoreError),

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// HTTP status, when the server answered.
        status: Option<u16>,
    },

    /// The server sent something the protocol does not allow.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The server refused the request.
    #[error("server rejected the request: {0}")]
    ServerRejected(String),

    /// The server cannot be reached.
    #[error("not connected: {0}")]
    NotConnected(String),
}

impl SyncError {
    /// Creates a transport error without a status.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
        }
    }

    /// Creates a transport error for an unexpected HTTP status.
    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: Some(status),
        }
    }

    /// Creates a protocol violation.
    pub fn protocol_violation(message: impl Into<String>) -> Self {
        Self::ProtocolViolation(message.into())
    }

    /// Returns true for transport failures.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Returns true if retrying the same operation later may succeed.
    ///
    /// Only transport failures qualify, and only the poll protocol decides
    /// whether to actually retry them.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.is_transport()
    }
}

impl From<ProtocolError> for SyncError {
    fn from(e: ProtocolError) -> Self {
        Self::ProtocolViolation(e.to_string())
    }
}
