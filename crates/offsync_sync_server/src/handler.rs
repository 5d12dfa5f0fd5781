//! Request handlers for sync endpoints.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::store::{ChangeFilter, ChangeStore};
use offsync_sync_protocol::{
    ChangeEntry, ClientIdentity, DownloadRequest, DownloadResponse, PollRequest, PollResponse, RecordId,
    Revision, UploadRequest, UploadResponse, Watermark,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Accepted changes (shared across all handlers).
    pub store: Arc<ChangeStore>,
    /// Issued identities and the last revision each client reported.
    clients: RwLock<HashMap<ClientIdentity, Option<Revision>>>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, store: Arc<ChangeStore>) -> Self {
        Self {
            config,
            store,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Issues a fresh client identity.
    fn issue_identity(&self) -> ClientIdentity {
        let identity = ClientIdentity::new(uuid::Uuid::new_v4().to_string());
        self.clients.write().insert(identity.clone(), None);
        identity
    }

    fn is_known(&self, identity: &ClientIdentity) -> bool {
        self.clients.read().contains_key(identity)
    }

    fn record_synced(&self, identity: &ClientIdentity, revision: Option<Revision>) {
        if let Some(synced) = self.clients.write().get_mut(identity) {
            *synced = revision;
        }
    }

    /// Returns the number of issued identities.
    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Returns the last revision `identity` reported as applied.
    pub fn synced_revision(&self, identity: &ClientIdentity) -> Option<Revision> {
        self.clients.read().get(identity).copied().flatten()
    }
}

/// Handler for sync requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Rejects changes the server cannot store.
    fn validate(&self, changes: &[ChangeEntry]) -> ServerResult<()> {
        for change in changes {
            change.mutation()?;
            if !self.context.config.accepts(&change.collection_name) {
                return Err(ServerError::UnknownCollection(change.collection_name.clone()));
            }
        }
        Ok(())
    }

    /// Handles an upload request.
    ///
    /// Every change is acknowledged. The returned watermark is the store's
    /// revision after recording them.
    pub fn handle_upload(&self, request: UploadRequest) -> ServerResult<UploadResponse> {
        self.validate(&request.changes)?;
        let change_ids: Vec<RecordId> = request.changes.iter().map(|c| c.id.clone()).collect();
        let revision = self.context.store.append(None, request.changes);
        tracing::debug!(changes = change_ids.len(), %revision, "upload accepted");
        Ok(UploadResponse {
            change_ids,
            last_update_ts: Watermark(revision.0),
        })
    }

    /// Handles a download request.
    pub fn handle_download(&self, request: DownloadRequest) -> ServerResult<DownloadResponse> {
        let since = Revision(request.last_update_ts.map_or(0, |w| w.0));
        let batch = self.context.store.changes_since(
            since,
            ChangeFilter {
                collections: Some(&request.collection_names),
                ..ChangeFilter::default()
            },
        );
        tracing::debug!(changes = batch.changes.len(), %since, "download served");
        Ok(DownloadResponse {
            changes: batch.changes,
        })
    }

    /// Handles one poll round.
    ///
    /// Invalid rounds are answered with `success: false` rather than an error.
    pub fn handle_poll(&self, request: PollRequest) -> PollResponse {
        match self.poll(request) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "poll round rejected");
                PollResponse::rejected(e.to_string())
            }
        }
    }

    fn poll(&self, request: PollRequest) -> ServerResult<PollResponse> {
        let (identity, issued) = match request.client_identity {
            Some(identity) if self.context.is_known(&identity) => (identity, false),
            Some(identity) => return Err(ServerError::UnknownClient(identity.to_string())),
            None => (self.context.issue_identity(), true),
        };
        if let Some(base) = request.base_revision {
            if base > self.context.store.revision() {
                return Err(ServerError::InvalidRequest(format!(
                    "base revision {base} is ahead of the server"
                )));
            }
        }
        self.validate(&request.changes)?;

        let received = request.changes.len();
        if received > 0 {
            self.context.store.append(Some(&identity), request.changes);
        }
        self.context.record_synced(&identity, request.synced_revision);

        let since = request.synced_revision.unwrap_or(Revision(0));
        let batch = self.context.store.changes_since(
            since,
            ChangeFilter {
                exclude_origin: Some(&identity),
                limit: Some(self.context.config.max_poll_batch),
                ..ChangeFilter::default()
            },
        );
        tracing::debug!(
            client = %identity,
            received,
            sent = batch.changes.len(),
            revision = %batch.up_to,
            partial = batch.more,
            "poll round"
        );

        let mut response = PollResponse::accepted(batch.changes, batch.up_to);
        response.partial = batch.more;
        if issued {
            response = response.with_client_identity(identity);
        }
        Ok(response)
    }
}
