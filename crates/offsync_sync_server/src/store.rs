//! Server-side change store.

use offsync_sync_protocol::{ChangeEntry, ClientIdentity, RecordId, Revision};
use parking_lot::RwLock;

/// A change as recorded by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChange {
    /// Revision assigned when the change was accepted.
    pub revision: Revision,
    /// Client that sent the change, when it came through a poll round.
    pub origin: Option<ClientIdentity>,
    /// The change itself.
    pub entry: ChangeEntry,
}

/// Changes read from the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeBatch {
    /// The changes, in revision order.
    pub changes: Vec<ChangeEntry>,
    /// Revision of the last stored change covered by this batch.
    pub up_to: Revision,
    /// True when more changes match than the batch holds.
    pub more: bool,
}

/// Filter for [`ChangeStore::changes_since`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeFilter<'a> {
    /// Only these collections, or all of them.
    pub collections: Option<&'a [String]>,
    /// Skip changes sent by this client.
    pub exclude_origin: Option<&'a ClientIdentity>,
    /// Maximum number of changes, or unlimited.
    pub limit: Option<usize>,
}

impl ChangeFilter<'_> {
    fn matches(&self, change: &StoredChange) -> bool {
        let wanted = self
            .collections
            .map_or(true, |names| names.iter().any(|n| *n == change.entry.collection_name));
        let foreign = match (self.exclude_origin, &change.origin) {
            (Some(excluded), Some(origin)) => excluded != origin,
            _ => true,
        };
        wanted && foreign
    }
}

struct Inner {
    /// Latest change per record, in revision order.
    changes: Vec<StoredChange>,
    /// Highest revision assigned so far.
    revision: u64,
}

/// In-memory log of accepted changes.
///
/// Every accepted change gets the next revision. Only the latest change of
/// each record is kept: a new change for a record replaces the older one, so
/// readers always see the record's current state.
pub struct ChangeStore {
    inner: RwLock<Inner>,
}

impl ChangeStore {
    /// Creates an empty store at revision 0.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                changes: Vec::new(),
                revision: 0,
            }),
        }
    }

    /// Returns the highest revision assigned so far.
    pub fn revision(&self) -> Revision {
        Revision(self.inner.read().revision)
    }

    /// Records `changes` in order and returns the resulting revision.
    pub fn append(&self, origin: Option<&ClientIdentity>, changes: Vec<ChangeEntry>) -> Revision {
        let mut inner = self.inner.write();
        for entry in changes {
            inner.revision += 1;
            let revision = Revision(inner.revision);
            inner
                .changes
                .retain(|c| !same_record(&c.entry, &entry.collection_name, &entry.id));
            inner.changes.push(StoredChange {
                revision,
                origin: origin.cloned(),
                entry,
            });
        }
        Revision(inner.revision)
    }

    /// Returns the changes with a revision above `since` that pass `filter`.
    ///
    /// Without a limit, or when everything fits, `up_to` is the store's
    /// current revision. Otherwise it is the revision of the last change
    /// returned, so that reading again from `up_to` continues the batch.
    pub fn changes_since(&self, since: Revision, filter: ChangeFilter<'_>) -> ChangeBatch {
        let inner = self.inner.read();
        let limit = filter.limit.unwrap_or(usize::MAX);
        let mut batch = ChangeBatch {
            changes: Vec::new(),
            up_to: Revision(inner.revision),
            more: false,
        };
        let mut last = since;
        for change in inner
            .changes
            .iter()
            .filter(|c| c.revision > since && filter.matches(c))
        {
            if batch.changes.len() == limit {
                batch.more = true;
                batch.up_to = last;
                break;
            }
            last = change.revision;
            batch.changes.push(change.entry.clone());
        }
        batch
    }

    /// Returns the stored change of one record.
    pub fn get(&self, collection: &str, id: &RecordId) -> Option<StoredChange> {
        self.inner
            .read()
            .changes
            .iter()
            .find(|c| same_record(&c.entry, collection, id))
            .cloned()
    }

    /// Returns the number of stored changes.
    pub fn len(&self) -> usize {
        self.inner.read().changes.len()
    }

    /// Returns true if no change is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every change, keeping the revision counter.
    pub fn clear(&self) {
        self.inner.write().changes.clear();
    }
}

impl Default for ChangeStore {
    fn default() -> Self {
        Self::new()
    }
}

fn same_record(entry: &ChangeEntry, collection: &str, id: &RecordId) -> bool {
    entry.collection_name == collection && entry.id == *id
}
