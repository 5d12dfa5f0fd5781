//! Upload coordinator.

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::http::{join_url, post_json, HttpClient};
use crate::target::SyncTarget;
use offsync_core::{store_watermark, ChangeLog, TransactionMode, CHANGES_STORE};
use offsync_sync_protocol::{UploadRequest, UploadResponse, Watermark};
use std::sync::Arc;

/// Result of one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UploadReport {
    /// Change entries sent to the server.
    pub sent: usize,
    /// Entries removed from the change log after acknowledgment.
    pub acknowledged: usize,
    /// Watermark in effect after the upload, if the server was contacted.
    pub watermark: Option<Watermark>,
}

/// Pushes the change log to a server.
pub struct UploadCoordinator {
    client: Arc<dyn HttpClient>,
    config: SyncConfig,
}

impl UploadCoordinator {
    /// Creates an upload coordinator.
    pub fn new(client: Arc<dyn HttpClient>, config: SyncConfig) -> Self {
        Self { client, config }
    }

    /// Uploads every pending change entry of `target` to `server_url`.
    ///
    /// With no pending entries the server is not contacted. Otherwise the
    /// acknowledged entries are deleted in one transaction and, once that
    /// commits, the watermark from the acknowledgment is stored.
    ///
    /// # Errors
    ///
    /// Fails if the change log cannot be read, the request fails or the
    /// deletions cannot be committed. The watermark is unchanged on failure.
    pub async fn upload(&self, target: &SyncTarget, server_url: &str) -> SyncResult<UploadReport> {
        let db = target.db();
        let changes = ChangeLog::pending(db)?;
        if changes.is_empty() {
            tracing::debug!(database = db.name(), "nothing to upload");
            return Ok(UploadReport::default());
        }

        let url = join_url(server_url, &self.config.upload_path);
        let request = UploadRequest { changes };
        let response: UploadResponse = post_json(self.client.as_ref(), &url, &request).await?;
        let changes = request.changes;

        let mut txn = db.transaction(&[CHANGES_STORE], TransactionMode::ReadWrite)?;
        let acknowledged = ChangeLog::acknowledge(&mut txn, &changes, &response.change_ids)?;
        txn.commit()?;

        let watermark = store_watermark(target.state(), response.last_update_ts)?;

        tracing::info!(
            database = db.name(),
            sent = changes.len(),
            acknowledged,
            %watermark,
            "upload complete"
        );
        Ok(UploadReport {
            sent: changes.len(),
            acknowledged,
            watermark: Some(watermark),
        })
    }
}
