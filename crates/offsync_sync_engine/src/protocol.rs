//! The poll sync protocol.
//!
//! One call to [`PollSyncProtocol::round`] performs one request/response
//! exchange with the server and decides when the next round should run:
//!
//! ```text
//! PENDING_REQUEST
//!   -> success, new identity   -> persist context -> apply -> accept -> again
//!   -> success, known identity ------------------> apply -> accept -> again
//!   -> success:false           -> fatal
//!   -> transport failure       -> online: retry after poll interval
//!                                 offline: fatal
//! ```

use crate::connectivity::ConnectivityOracle;
use crate::context::SyncContext;
use crate::error::{SyncError, SyncResult};
use crate::http::HttpClient;
use async_trait::async_trait;
use offsync_sync_protocol::{ChangeEntry, PollRequest, PollResponse, Revision};
use std::sync::Arc;
use std::time::Duration;

/// Message returned when the poll endpoint answers with a non-2xx status.
pub const SERVER_ERROR_MESSAGE: &str = "Some server error occurred";

/// Sends a poll request and returns the server's answer.
#[async_trait]
pub trait Communicator: Send + Sync {
    /// Exchanges one round with the server at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Transport`] when the server cannot be reached.
    async fn exchange(&self, url: &str, request: &PollRequest) -> SyncResult<PollResponse>;
}

/// Communicator posting JSON over an [`HttpClient`].
///
/// A non-2xx answer becomes an unsuccessful [`PollResponse`] rather than an
/// error, so the protocol treats it as a server rejection.
pub struct HttpCommunicator {
    client: Arc<dyn HttpClient>,
}

impl HttpCommunicator {
    /// Creates a communicator.
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Communicator for HttpCommunicator {
    async fn exchange(&self, url: &str, request: &PollRequest) -> SyncResult<PollResponse> {
        let body = offsync_sync_protocol::encode(request)?;
        let response = self.client.post(url, body).await?;
        if !response.is_success() {
            tracing::debug!(url, status = response.status, "poll endpoint answered with an error");
            return Ok(PollResponse::rejected(SERVER_ERROR_MESSAGE));
        }
        Ok(offsync_sync_protocol::decode(&response.body)?)
    }
}

/// The local replica a protocol round reads from and writes to.
pub trait ReplicationHost: Send + Sync {
    /// Applies the server's changes and records `new_revision` as synced.
    ///
    /// With `clear` set, the local collections are emptied first.
    ///
    /// # Errors
    ///
    /// Returns an error if the changes cannot be applied; nothing is
    /// applied in that case.
    fn apply_remote_changes(
        &self,
        changes: Vec<ChangeEntry>,
        new_revision: Option<Revision>,
        partial: bool,
        clear: bool,
    ) -> SyncResult<()>;

    /// Called once the server has accepted the local changes of the round.
    ///
    /// # Errors
    ///
    /// Returns an error if the accepted changes cannot be cleared.
    fn on_changes_accepted(&self) -> SyncResult<()>;
}

/// What the client sends in one round, besides its identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundInput {
    /// Revision the local changes are based on.
    pub base_revision: Option<Revision>,
    /// Last server revision applied locally.
    pub synced_revision: Option<Revision>,
    /// Local changes to send.
    pub changes: Vec<ChangeEntry>,
    /// True when more local changes remain than are sent.
    pub partial: bool,
}

/// When to try again after a failed round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAfter {
    /// Retry after this delay.
    After(Duration),
    /// Do not retry; the connection needs an explicit reconnect.
    Never,
}

/// Outcome of one round.
#[derive(Debug)]
pub enum RoundOutcome {
    /// The round completed; run the next one after `again`.
    Success {
        /// Delay before the next round.
        again: Duration,
    },
    /// The round failed.
    Failed {
        /// What went wrong.
        error: SyncError,
        /// Whether and when to retry.
        retry_after: RetryAfter,
    },
}

impl RoundOutcome {
    fn fatal(error: SyncError) -> Self {
        Self::Failed {
            error,
            retry_after: RetryAfter::Never,
        }
    }

    /// Returns true for a completed round.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns true for a failure that must not be retried.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Failed {
                retry_after: RetryAfter::Never,
                ..
            }
        )
    }
}

/// Runs poll rounds against one kind of server.
pub struct PollSyncProtocol {
    communicator: Arc<dyn Communicator>,
    oracle: Arc<dyn ConnectivityOracle>,
    poll_interval: Duration,
}

impl PollSyncProtocol {
    /// Creates a protocol instance.
    pub fn new(
        communicator: Arc<dyn Communicator>,
        oracle: Arc<dyn ConnectivityOracle>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            communicator,
            oracle,
            poll_interval,
        }
    }

    /// Returns the poll interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Runs one round for the url of `context`.
    ///
    /// Never fails: every outcome, including errors, is reported in the
    /// returned [`RoundOutcome`].
    pub async fn round(
        &self,
        context: &mut SyncContext,
        input: RoundInput,
        host: &dyn ReplicationHost,
    ) -> RoundOutcome {
        let url = context.url().to_string();
        let request = PollRequest {
            client_identity: context.client_identity().cloned(),
            base_revision: input.base_revision,
            partial: input.partial,
            changes: input.changes,
            synced_revision: input.synced_revision,
        };

        let response = match self.communicator.exchange(&url, &request).await {
            Ok(response) => response,
            Err(error) if error.is_transport() => {
                return if self.oracle.is_online(Some(&url)).await {
                    tracing::warn!(url = %url, error = %error, "round failed, will retry");
                    RoundOutcome::Failed {
                        error,
                        retry_after: RetryAfter::After(self.poll_interval),
                    }
                } else {
                    tracing::warn!(url = %url, error = %error, "round failed while offline");
                    RoundOutcome::fatal(error)
                };
            }
            Err(error) => return RoundOutcome::fatal(error),
        };

        if !response.success {
            let message = response
                .error_message
                .unwrap_or_else(|| "server refused the round".to_string());
            tracing::warn!(url = %url, message = %message, "server rejected round");
            return RoundOutcome::fatal(SyncError::ServerRejected(message));
        }

        if context.client_identity().is_none() {
            let Some(identity) = response.client_identity else {
                return RoundOutcome::fatal(SyncError::protocol_violation(
                    "server issued no client identity",
                ));
            };
            if let Err(error) = context.establish(identity) {
                tracing::warn!(url = %url, error = %error, "could not persist client identity");
                return RoundOutcome::fatal(error);
            }
        }

        let received = response.changes.len();
        if let Err(error) = host.apply_remote_changes(
            response.changes,
            response.current_revision,
            response.partial,
            false,
        ) {
            return RoundOutcome::fatal(error);
        }
        if let Err(error) = host.on_changes_accepted() {
            return RoundOutcome::fatal(error);
        }

        tracing::debug!(
            url = %url,
            sent = request.changes.len(),
            received,
            revision = ?response.current_revision,
            "round complete"
        );
        RoundOutcome::Success {
            again: self.poll_interval,
        }
    }
}
