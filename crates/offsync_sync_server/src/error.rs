//! Error types for the sync server.

use offsync_sync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The request body is not a valid message.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A change targets a collection the server does not accept.
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    /// A poll round carries an identity the server never issued.
    #[error("unknown client identity: {0}")]
    UnknownClient(String),

    /// No endpoint at this path.
    #[error("no endpoint at {0}")]
    NotFound(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ServerError::Internal(_))
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Internal(_))
    }

    /// Returns the HTTP status for this error.
    pub fn status(&self) -> u16 {
        match self {
            ServerError::NotFound(_) => 404,
            ServerError::Internal(_) => 500,
            _ => 400,
        }
    }
}

impl From<ProtocolError> for ServerError {
    fn from(err: ProtocolError) -> Self {
        ServerError::InvalidRequest(err.to_string())
    }
}
