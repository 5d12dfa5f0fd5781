//! Main sync server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use crate::store::ChangeStore;
use offsync_sync_protocol::{
    decode, encode, DownloadRequest, DownloadResponse, PollRequest, PollResponse, UploadRequest, UploadResponse,
};
use serde_json::json;
use std::sync::Arc;

/// An HTTP status with a JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl Reply {
    fn ok(body: Vec<u8>) -> Self {
        Self { status: 200, body }
    }

    fn error(err: &ServerError) -> Self {
        let body = serde_json::to_vec(&json!({ "error": err.to_string() })).unwrap_or_default();
        Self {
            status: err.status(),
            body,
        }
    }
}

/// The sync server.
///
/// Keeps every accepted change in memory and serves the upload, download
/// and poll endpoints. Requests are plain path plus JSON body pairs, so the
/// server can be mounted behind any HTTP stack.
///
/// # Example
///
/// ```
/// use offsync_sync_server::{ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::default());
/// let reply = server.handle_post("/api/v1/upload", br#"{"changes":[]}"#);
/// assert_eq!(reply.status, 200);
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl SyncServer {
    /// Creates a new sync server.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(ChangeStore::new()))
    }

    /// Creates a sync server over an existing change store.
    pub fn with_store(config: ServerConfig, store: Arc<ChangeStore>) -> Self {
        let context = Arc::new(HandlerContext::new(config, store));
        let handler = RequestHandler::new(Arc::clone(&context));
        Self { handler, context }
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Returns the change store.
    pub fn store(&self) -> &Arc<ChangeStore> {
        &self.context.store
    }

    /// Returns the handler context.
    pub fn context(&self) -> &HandlerContext {
        &self.context
    }

    /// Handles an upload request.
    pub fn handle_upload(&self, request: UploadRequest) -> ServerResult<UploadResponse> {
        self.handler.handle_upload(request)
    }

    /// Handles a download request.
    pub fn handle_download(&self, request: DownloadRequest) -> ServerResult<DownloadResponse> {
        self.handler.handle_download(request)
    }

    /// Handles one poll round.
    pub fn handle_poll(&self, request: PollRequest) -> PollResponse {
        self.handler.handle_poll(request)
    }

    /// Routes a POST request to its endpoint.
    pub fn handle_post(&self, path: &str, body: &[u8]) -> Reply {
        match self.route(path, body) {
            Ok(body) => Reply::ok(body),
            Err(e) => {
                tracing::info!(path, error = %e, "request failed");
                Reply::error(&e)
            }
        }
    }

    /// Answers a HEAD request; only connectivity probes exist.
    pub fn handle_head(&self, path: &str) -> u16 {
        let probe = path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .is_some_and(|last| last == self.context.config.check_path);
        if probe {
            200
        } else {
            404
        }
    }

    fn route(&self, path: &str, body: &[u8]) -> ServerResult<Vec<u8>> {
        let config = &self.context.config;
        let reply = if path == config.upload_path {
            encode(&self.handle_upload(decode(body)?)?)
        } else if path == config.download_path {
            encode(&self.handle_download(decode(body)?)?)
        } else if path == config.poll_path {
            encode(&self.handle_poll(decode(body)?))
        } else {
            return Err(ServerError::NotFound(path.to_string()));
        };
        reply.map_err(|e| ServerError::Internal(e.to_string()))
    }
}
