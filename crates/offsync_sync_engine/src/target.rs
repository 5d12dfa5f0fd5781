//! The local side of a sync: database, collections and local state.

use crate::error::{SyncError, SyncResult};
use offsync_core::{Database, LocalState, CHANGES_STORE};
use std::sync::Arc;

/// The database and collections a sync operates on.
#[derive(Clone)]
pub struct SyncTarget {
    db: Database,
    collection_names: Vec<String>,
    state: Arc<dyn LocalState>,
}

impl SyncTarget {
    /// Creates a sync target.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidArgument`] if no collection is named or a
    /// named collection is not a store of `db`.
    pub fn new(db: Database, collection_names: &[&str], state: Arc<dyn LocalState>) -> SyncResult<Self> {
        if collection_names.is_empty() {
            return Err(SyncError::InvalidArgument("no collections to sync".into()));
        }
        if let Some(name) = collection_names
            .iter()
            .find(|n| **n == CHANGES_STORE || !db.has_store(n))
        {
            return Err(SyncError::InvalidArgument(format!(
                "{name} is not a collection of {}",
                db.name()
            )));
        }
        Ok(Self {
            db,
            collection_names: collection_names.iter().map(|s| (*s).to_string()).collect(),
            state,
        })
    }

    /// Returns the database.
    #[must_use]
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Returns the synced collection names.
    #[must_use]
    pub fn collection_names(&self) -> &[String] {
        &self.collection_names
    }

    /// Returns the local state.
    #[must_use]
    pub fn state(&self) -> &dyn LocalState {
        self.state.as_ref()
    }

    /// Returns a shared handle on the local state.
    #[must_use]
    pub fn state_handle(&self) -> Arc<dyn LocalState> {
        Arc::clone(&self.state)
    }

    /// Returns true if `name` is one of the synced collections.
    #[must_use]
    pub fn syncs(&self, name: &str) -> bool {
        self.collection_names.iter().any(|n| n == name)
    }
}

impl std::fmt::Debug for SyncTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncTarget")
            .field("db", &self.db.name())
            .field("collection_names", &self.collection_names)
            .finish_non_exhaustive()
    }
}
