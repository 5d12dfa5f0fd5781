//! Scoped transactions.
//!
//! A [`Transaction`] collects writes against the stores named when it was
//! begun. [`Transaction::commit`] seals it and makes every write durable
//! and visible at once. After sealing, each operation fails with
//! [`CoreError::TransactionInactive`].

mod state;

pub use state::{PendingWrite, TransactionState};

use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::log_record::LoggedWrite;
use crate::types::{Key, TransactionId, TransactionMode, KEY_PATH};
use offsync_sync_protocol::RecordId;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// A transaction over a fixed set of stores.
///
/// Writes are buffered until commit; reads through the transaction see the
/// buffered writes on top of the committed contents. A failed `put` or
/// `delete` aborts the transaction, so nothing it registered becomes
/// visible.
pub struct Transaction {
    db: Database,
    id: TransactionId,
    mode: TransactionMode,
    scope: BTreeSet<String>,
    state: TransactionState,
    /// Pending writes: (store, key) -> write operation.
    writes: BTreeMap<(String, Key), PendingWrite>,
}

impl Transaction {
    pub(crate) fn new(db: Database, id: TransactionId, mode: TransactionMode, scope: &[&str]) -> Self {
        Self {
            db,
            id,
            mode,
            scope: scope.iter().map(|s| (*s).to_string()).collect(),
            state: TransactionState::Active,
            writes: BTreeMap::new(),
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the access mode.
    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Checks if the transaction still accepts operations.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Returns the number of pending writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is inactive, read-only, does not cover
    /// `store`, or `key` is not a valid key. Every failure except the first
    /// aborts the transaction.
    pub fn put(&mut self, store: &str, key: Key, value: Value) -> CoreResult<()> {
        self.ensure_writable(store)?;
        if key.id().as_str().is_empty() {
            return Err(self.fail(CoreError::invalid_key(store, "empty key")));
        }
        self.writes
            .insert((store.to_string(), key), PendingWrite::Put(value));
        Ok(())
    }

    /// Stores a record under the id found at its `id` field.
    ///
    /// Returns the id the record was stored under.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DataClone`] if `record` is not a JSON object and
    /// [`CoreError::InvalidKey`] if its `id` is missing or is neither a
    /// non-empty string nor an integer. Both abort the transaction.
    pub fn put_record(&mut self, store: &str, record: Value) -> CoreResult<RecordId> {
        self.ensure_writable(store)?;
        if !record.is_object() {
            return Err(self.fail(CoreError::data_clone(store, "records must be JSON objects")));
        }
        let Some(id) = record.get(KEY_PATH).and_then(RecordId::from_value) else {
            return Err(self.fail(CoreError::invalid_key(
                store,
                format!("record has no valid `{KEY_PATH}`"),
            )));
        };
        self.put(store, Key::Id(id.clone()), record)?;
        Ok(id)
    }

    /// Deletes the record under `key`. Deleting an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is inactive, read-only or does not cover
    /// `store`.
    pub fn delete(&mut self, store: &str, key: &Key) -> CoreResult<()> {
        self.ensure_writable(store)?;
        self.writes
            .insert((store.to_string(), key.clone()), PendingWrite::Delete);
        Ok(())
    }

    /// Reads the record under `key`, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is inactive or does not cover `store`.
    pub fn get(&self, store: &str, key: &Key) -> CoreResult<Option<Value>> {
        self.ensure_readable(store)?;
        if let Some(pending) = self.writes.get(&(store.to_string(), key.clone())) {
            return Ok(pending.value().cloned());
        }
        Ok(self.db.read_record(store, key))
    }

    /// Reads every record of `store` in key order.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is inactive or does not cover `store`.
    pub fn get_all(&self, store: &str) -> CoreResult<Vec<(Key, Value)>> {
        self.ensure_readable(store)?;
        let mut data = self.db.read_store(store);
        for ((s, key), write) in &self.writes {
            if s != store {
                continue;
            }
            match write {
                PendingWrite::Put(value) => {
                    data.insert(key.clone(), value.clone());
                }
                PendingWrite::Delete => {
                    data.remove(key);
                }
            }
        }
        Ok(data.into_iter().collect())
    }

    /// Commits the transaction.
    ///
    /// The transaction is sealed whether or not the commit succeeds. On
    /// failure none of its writes are visible.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is inactive or the commit record could not
    /// be written.
    pub fn commit(&mut self) -> CoreResult<()> {
        self.ensure_active()?;
        if self.writes.is_empty() {
            self.state = TransactionState::Committed;
            return Ok(());
        }

        let writes = std::mem::take(&mut self.writes)
            .into_iter()
            .map(|((store, key), write)| match write {
                PendingWrite::Put(value) => LoggedWrite::Put { store, key, value },
                PendingWrite::Delete => LoggedWrite::Delete { store, key },
            })
            .collect();

        match self.db.apply_commit(self.id, writes) {
            Ok(()) => {
                self.state = TransactionState::Committed;
                Ok(())
            }
            Err(e) => {
                self.state = TransactionState::Aborted;
                tracing::warn!(txn = %self.id, error = %e, "commit failed");
                Err(e)
            }
        }
    }

    /// Aborts the transaction, discarding every pending write.
    ///
    /// Aborting a sealed transaction has no effect.
    pub fn abort(&mut self) {
        if self.is_active() {
            self.writes.clear();
            self.state = TransactionState::Aborted;
        }
    }

    fn fail(&mut self, error: CoreError) -> CoreError {
        tracing::debug!(txn = %self.id, error = %error, "aborting transaction");
        self.abort();
        error
    }

    fn ensure_active(&self) -> CoreResult<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            state => Err(CoreError::TransactionInactive {
                state: state.as_str(),
            }),
        }
    }

    fn ensure_readable(&self, store: &str) -> CoreResult<()> {
        self.ensure_active()?;
        if self.scope.contains(store) {
            Ok(())
        } else {
            Err(CoreError::store_not_found(store))
        }
    }

    fn ensure_writable(&mut self, store: &str) -> CoreResult<()> {
        self.ensure_active()?;
        if !self.scope.contains(store) {
            return Err(self.fail(CoreError::store_not_found(store)));
        }
        if self.mode == TransactionMode::ReadOnly {
            return Err(self.fail(CoreError::ReadOnly {
                store: store.to_string(),
            }));
        }
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.is_active() && !self.writes.is_empty() {
            tracing::debug!(
                txn = %self.id,
                writes = self.writes.len(),
                "transaction dropped without commit"
            );
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("writes", &self.writes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use offsync_storage::InMemoryBackend;
    use serde_json::json;

    fn create_db() -> Database {
        Database::open("txn", &["todos", "notes"], Config::in_memory()).unwrap()
    }

    fn rw(db: &Database) -> Transaction {
        db.transaction(&["todos"], TransactionMode::ReadWrite).unwrap()
    }

    #[test]
    fn new_transaction_is_active() {
        let db = create_db();
        let txn = rw(&db);
        assert!(txn.is_active());
        assert_eq!(txn.state(), TransactionState::Active);
        assert_eq!(txn.mode(), TransactionMode::ReadWrite);
    }

    #[test]
    fn reads_see_own_writes() {
        let db = create_db();
        let mut txn = rw(&db);
        txn.put_record("todos", json!({"id": "a"})).unwrap();
        assert_eq!(txn.get("todos", &Key::from("a")).unwrap(), Some(json!({"id": "a"})));

        let other = db.transaction(&["todos"], TransactionMode::ReadOnly).unwrap();
        assert_eq!(other.get("todos", &Key::from("a")).unwrap(), None);
    }

    #[test]
    fn commit_makes_writes_visible() {
        let db = create_db();
        let mut txn = rw(&db);
        txn.put_record("todos", json!({"id": "a", "v": 1})).unwrap();
        txn.put_record("todos", json!({"id": "a", "v": 2})).unwrap();
        txn.commit().unwrap();
        assert_eq!(txn.state(), TransactionState::Committed);

        let txn = db.transaction(&["todos"], TransactionMode::ReadOnly).unwrap();
        assert_eq!(txn.get("todos", &Key::from("a")).unwrap(), Some(json!({"id": "a", "v": 2})));
    }

    #[test]
    fn operations_after_commit_are_inactive() {
        let db = create_db();
        let mut txn = rw(&db);
        txn.commit().unwrap();

        let err = txn.put_record("todos", json!({"id": "late"})).unwrap_err();
        assert!(matches!(err, CoreError::TransactionInactive { state: "committed" }));
        assert!(matches!(
            txn.delete("todos", &Key::from("x")),
            Err(CoreError::TransactionInactive { .. })
        ));
        assert!(matches!(
            txn.get("todos", &Key::from("x")),
            Err(CoreError::TransactionInactive { .. })
        ));
        assert!(matches!(txn.commit(), Err(CoreError::TransactionInactive { .. })));
    }

    #[test]
    fn invalid_key_aborts() {
        let db = create_db();
        let mut txn = rw(&db);
        txn.put_record("todos", json!({"id": "ok"})).unwrap();

        let err = txn.put_record("todos", json!({"id": 1.5})).unwrap_err();
        assert!(matches!(err, CoreError::InvalidKey { .. }));
        assert_eq!(txn.state(), TransactionState::Aborted);
        assert!(matches!(txn.commit(), Err(CoreError::TransactionInactive { state: "aborted" })));

        let txn = db.transaction(&["todos"], TransactionMode::ReadOnly).unwrap();
        assert!(txn.get_all("todos").unwrap().is_empty());
    }

    #[test]
    fn non_object_is_data_clone() {
        let db = create_db();
        let mut txn = rw(&db);
        assert!(matches!(
            txn.put_record("todos", json!([1, 2])),
            Err(CoreError::DataClone { .. })
        ));
        assert!(!txn.is_active());
    }

    #[test]
    fn out_of_scope_write_aborts() {
        let db = create_db();
        let mut txn = rw(&db);
        let err = txn.put_record("notes", json!({"id": "n"})).unwrap_err();
        assert!(matches!(err, CoreError::StoreNotFound { .. }));
        assert!(!txn.is_active());
    }

    #[test]
    fn read_only_rejects_writes() {
        let db = create_db();
        let mut txn = db.transaction(&["todos"], TransactionMode::ReadOnly).unwrap();
        assert!(matches!(
            txn.delete("todos", &Key::from("a")),
            Err(CoreError::ReadOnly { .. })
        ));
    }

    #[test]
    fn get_all_is_key_ordered_and_merged() {
        let db = create_db();
        let mut txn = rw(&db);
        for id in ["c", "a", "b"] {
            txn.put_record("todos", json!({"id": id})).unwrap();
        }
        txn.commit().unwrap();

        let mut txn = rw(&db);
        txn.delete("todos", &Key::from("b")).unwrap();
        txn.put_record("todos", json!({"id": "d"})).unwrap();
        let keys: Vec<_> = txn
            .get_all("todos")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k.to_string())
            .collect();
        assert_eq!(keys, ["a", "c", "d"]);
    }

    #[test]
    fn failed_commit_leaves_nothing_visible() {
        let backend = InMemoryBackend::new();
        let db = Database::open_with_backend("t", &["todos"], Config::default(), Box::new(backend.clone()))
            .unwrap();
        backend.fail_writes(true);

        let mut txn = rw(&db);
        txn.put_record("todos", json!({"id": "a"})).unwrap();
        assert!(matches!(txn.commit(), Err(CoreError::Storage(_))));
        assert_eq!(txn.state(), TransactionState::Aborted);

        backend.fail_writes(false);
        let txn = db.transaction(&["todos"], TransactionMode::ReadOnly).unwrap();
        assert_eq!(txn.get("todos", &Key::from("a")).unwrap(), None);
    }

    #[test]
    fn abort_discards_writes() {
        let db = create_db();
        let mut txn = rw(&db);
        txn.put_record("todos", json!({"id": "a"})).unwrap();
        txn.abort();
        assert_eq!(txn.write_count(), 0);
        assert!(matches!(txn.commit(), Err(CoreError::TransactionInactive { .. })));
    }
}
