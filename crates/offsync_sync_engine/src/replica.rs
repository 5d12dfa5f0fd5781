//! The poll protocol's host side over a local database.

use crate::download::apply_changes;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{ReplicationHost, RoundInput};
use crate::target::SyncTarget;
use offsync_core::{ChangeLog, CoreError, TransactionMode, CHANGES_STORE};
use offsync_sync_protocol::{ChangeEntry, RecordId, Revision};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Replica backed by the change log of a [`SyncTarget`].
///
/// Each round sends up to `partials_threshold` pending entries of the synced
/// collections. When the server accepts them, exactly those entries are
/// removed from the change log unless they were replaced in the meantime.
/// The last applied server revision is kept in local state per url.
pub struct ChangeLogReplica {
    target: SyncTarget,
    url: String,
    partials_threshold: usize,
    in_flight: Mutex<Vec<ChangeEntry>>,
    local_partial: AtomicBool,
    remote_partial: AtomicBool,
}

impl ChangeLogReplica {
    /// Creates a replica of `target` for the server at `url`.
    pub fn new(target: SyncTarget, url: impl Into<String>, partials_threshold: usize) -> Self {
        Self {
            target,
            url: url.into(),
            partials_threshold: partials_threshold.max(1),
            in_flight: Mutex::new(Vec::new()),
            local_partial: AtomicBool::new(false),
            remote_partial: AtomicBool::new(false),
        }
    }

    fn revision_key(&self) -> String {
        format!("syncedRevision:{}", self.url)
    }

    /// Returns the last server revision applied locally.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored revision cannot be read.
    pub fn synced_revision(&self) -> SyncResult<Option<Revision>> {
        self.target
            .state()
            .get(&self.revision_key())?
            .map(|raw| {
                raw.parse::<u64>().map(Revision).map_err(|_| {
                    SyncError::Storage(CoreError::codec(format!("invalid revision {raw:?}")))
                })
            })
            .transpose()
    }

    /// Reads the local changes for the next round.
    ///
    /// # Errors
    ///
    /// Returns an error if the change log or revision cannot be read.
    pub fn next_round(&self) -> SyncResult<RoundInput> {
        let names: Vec<&str> = self
            .target
            .collection_names()
            .iter()
            .map(String::as_str)
            .collect();
        let mut changes = ChangeLog::pending_in(self.target.db(), &names)?;
        let partial = changes.len() > self.partials_threshold;
        changes.truncate(self.partials_threshold);

        *self.in_flight.lock() = changes.clone();
        self.local_partial.store(partial, Ordering::SeqCst);

        let synced = self.synced_revision()?;
        Ok(RoundInput {
            base_revision: synced,
            synced_revision: synced,
            changes,
            partial,
        })
    }

    /// Returns true if the last round left local or remote changes behind.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.local_partial.load(Ordering::SeqCst) || self.remote_partial.load(Ordering::SeqCst)
    }

    /// Forgets the synced revision of this url.
    ///
    /// # Errors
    ///
    /// Returns an error if the local state cannot be written.
    pub fn forget(&self) -> SyncResult<()> {
        Ok(self.target.state().remove(&self.revision_key())?)
    }
}

impl ReplicationHost for ChangeLogReplica {
    fn apply_remote_changes(
        &self,
        changes: Vec<ChangeEntry>,
        new_revision: Option<Revision>,
        partial: bool,
        clear: bool,
    ) -> SyncResult<()> {
        if let Some(change) = changes.iter().find(|c| !self.target.syncs(&c.collection_name)) {
            return Err(SyncError::protocol_violation(format!(
                "change for unsynced collection {}",
                change.collection_name
            )));
        }
        let cleared = if clear {
            self.target.collection_names().to_vec()
        } else {
            Vec::new()
        };
        let report = apply_changes(self.target.db(), &changes, &cleared)?;

        if let Some(revision) = new_revision {
            self.target
                .state()
                .set(&self.revision_key(), &revision.to_string())?;
        }
        self.remote_partial.store(partial, Ordering::SeqCst);
        tracing::debug!(url = %self.url, applied = report.applied, ?new_revision, "applied remote changes");
        Ok(())
    }

    fn on_changes_accepted(&self) -> SyncResult<()> {
        let sent = std::mem::take(&mut *self.in_flight.lock());
        if sent.is_empty() {
            return Ok(());
        }
        let ids: Vec<RecordId> = sent.iter().map(|e| e.id.clone()).collect();
        let mut txn = self
            .target
            .db()
            .transaction(&[CHANGES_STORE], TransactionMode::ReadWrite)?;
        let removed = ChangeLog::acknowledge(&mut txn, &sent, &ids)?;
        txn.commit()?;
        tracing::debug!(url = %self.url, removed, "accepted local changes");
        Ok(())
    }
}
