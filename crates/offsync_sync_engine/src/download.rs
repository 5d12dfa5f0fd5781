//! Download coordinator.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::http::{join_url, post_json, HttpClient};
use crate::target::SyncTarget;
use offsync_core::{load_watermark, Database, Key, TransactionMode, CHANGES_STORE};
use offsync_sync_protocol::{ChangeEntry, DownloadRequest, DownloadResponse, Mutation};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Result of one download.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DownloadReport {
    /// Number of remote changes applied.
    pub applied: usize,
    /// Collections written, sorted.
    pub collections: Vec<String>,
}

/// Pulls remote changes newer than the local watermark.
pub struct DownloadCoordinator {
    client: Arc<dyn HttpClient>,
    config: SyncConfig,
}

impl DownloadCoordinator {
    /// Creates a download coordinator.
    pub fn new(client: Arc<dyn HttpClient>, config: SyncConfig) -> Self {
        Self { client, config }
    }

    /// Requests the changes of `target`'s collections newer than its
    /// watermark and applies them.
    ///
    /// All changes are applied in one transaction over exactly the affected
    /// collections. The change log is never written.
    ///
    /// # Errors
    ///
    /// Fails on transport errors, with [`SyncError::ProtocolViolation`] if
    /// any change is malformed, and with a storage error if the changes
    /// cannot be committed. Nothing is applied on failure.
    pub async fn download(&self, target: &SyncTarget, server_url: &str) -> SyncResult<DownloadReport> {
        let request = DownloadRequest {
            last_update_ts: load_watermark(target.state())?,
            collection_names: target.collection_names().to_vec(),
        };
        let url = join_url(server_url, &self.config.download_path);
        let response: DownloadResponse = post_json(self.client.as_ref(), &url, &request).await?;

        if response.changes.is_empty() {
            tracing::debug!(database = target.db().name(), "no remote changes");
            return Ok(DownloadReport::default());
        }

        let report = apply_changes(target.db(), &response.changes, &[])?;
        tracing::info!(
            database = target.db().name(),
            applied = report.applied,
            collections = ?report.collections,
            "download complete"
        );
        Ok(report)
    }
}

/// Applies remote `changes` in a single transaction.
///
/// Every change is validated before the transaction begins. The `cleared`
/// collections are emptied first, in the same transaction.
pub(crate) fn apply_changes(
    db: &Database,
    changes: &[ChangeEntry],
    cleared: &[String],
) -> SyncResult<DownloadReport> {
    let mut grouped: BTreeMap<&str, Vec<(&ChangeEntry, Mutation<'_>)>> = BTreeMap::new();
    for change in changes {
        let mutation = change.mutation()?;
        let collection = change.collection_name.as_str();
        if collection == CHANGES_STORE || !db.has_store(collection) {
            return Err(SyncError::protocol_violation(format!(
                "change for unknown collection {collection}"
            )));
        }
        grouped.entry(collection).or_default().push((change, mutation));
    }

    let cleared: Vec<&str> = cleared
        .iter()
        .map(String::as_str)
        .filter(|name| *name != CHANGES_STORE)
        .collect();
    let mut scope: Vec<&str> = grouped.keys().copied().collect();
    scope.extend(cleared.iter().copied());
    scope.sort_unstable();
    scope.dedup();
    if scope.is_empty() {
        return Ok(DownloadReport::default());
    }

    let mut txn = db.transaction(&scope, TransactionMode::ReadWrite)?;
    for name in cleared {
        for (key, _) in txn.get_all(name)? {
            txn.delete(name, &key)?;
        }
    }
    for (collection, entries) in &grouped {
        for (change, mutation) in entries {
            match mutation {
                Mutation::Put(record) => {
                    txn.put_record(collection, (*record).clone())?;
                }
                Mutation::Delete => txn.delete(collection, &Key::from(&change.id))?,
            }
        }
    }
    txn.commit()?;

    Ok(DownloadReport {
        applied: changes.len(),
        collections: grouped.keys().map(|s| (*s).to_string()).collect(),
    })
}
