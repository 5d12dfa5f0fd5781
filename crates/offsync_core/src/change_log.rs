//! The change log.
//!
//! Pending mutations live in the changes store, one entry per
//! (collection, id). Recording a new mutation of the same record replaces
//! the previous entry, so the log always holds the latest state to upload.

use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::transaction::Transaction;
use crate::types::{Key, TransactionMode};
use offsync_sync_protocol::{ChangeEntry, RecordId};
use serde_json::Value;
use std::collections::HashSet;

/// Name of the store holding pending change entries.
pub const CHANGES_STORE: &str = "changesDBStore";

/// Operations on the changes store.
#[derive(Debug, Clone, Copy)]
pub struct ChangeLog;

impl ChangeLog {
    /// Returns the changes-store key of `entry`.
    #[must_use]
    pub fn key(collection: &str, id: &RecordId) -> Key {
        Key::compound(collection, id.clone())
    }

    /// Registers `entry` in `txn`, replacing any pending entry for the same
    /// record.
    ///
    /// # Errors
    ///
    /// Fails if the transaction cannot write to the changes store.
    pub fn record(txn: &mut Transaction, entry: &ChangeEntry) -> CoreResult<()> {
        let value = serde_json::to_value(entry)?;
        txn.put(
            CHANGES_STORE,
            Self::key(&entry.collection_name, &entry.id),
            value,
        )
    }

    /// Reads the pending entry for one record.
    ///
    /// # Errors
    ///
    /// Fails if the transaction cannot read the changes store or the entry
    /// cannot be decoded.
    pub fn get(txn: &Transaction, collection: &str, id: &RecordId) -> CoreResult<Option<ChangeEntry>> {
        txn.get(CHANGES_STORE, &Self::key(collection, id))?
            .map(decode)
            .transpose()
    }

    /// Reads every pending entry, ordered by (collection, id).
    ///
    /// # Errors
    ///
    /// Fails if the changes store cannot be read.
    pub fn pending(db: &Database) -> CoreResult<Vec<ChangeEntry>> {
        let txn = db.transaction(&[CHANGES_STORE], TransactionMode::ReadOnly)?;
        Self::pending_in_txn(&txn)
    }

    /// Reads the pending entries of the named collections.
    ///
    /// # Errors
    ///
    /// Fails if the changes store cannot be read.
    pub fn pending_in(db: &Database, collections: &[&str]) -> CoreResult<Vec<ChangeEntry>> {
        let wanted: HashSet<&str> = collections.iter().copied().collect();
        Ok(Self::pending(db)?
            .into_iter()
            .filter(|entry| wanted.contains(entry.collection_name.as_str()))
            .collect())
    }

    /// Reads every pending entry through `txn`.
    ///
    /// # Errors
    ///
    /// Fails if the transaction cannot read the changes store.
    pub fn pending_in_txn(txn: &Transaction) -> CoreResult<Vec<ChangeEntry>> {
        txn.get_all(CHANGES_STORE)?
            .into_iter()
            .map(|(_, value)| decode(value))
            .collect()
    }

    /// Deletes the entries of `sent` whose id is in `acknowledged`.
    ///
    /// An entry is only deleted if it is still the one that was sent: a
    /// record mutated again after the batch was read keeps its newer entry.
    /// Returns the number of entries deleted.
    ///
    /// # Errors
    ///
    /// Fails if the transaction cannot read or write the changes store.
    pub fn acknowledge(
        txn: &mut Transaction,
        sent: &[ChangeEntry],
        acknowledged: &[RecordId],
    ) -> CoreResult<usize> {
        let acknowledged: HashSet<&RecordId> = acknowledged.iter().collect();
        let mut removed = 0;
        for entry in sent.iter().filter(|e| acknowledged.contains(&e.id)) {
            let current = Self::get(txn, &entry.collection_name, &entry.id)?;
            if current.as_ref() == Some(entry) {
                txn.delete(CHANGES_STORE, &Self::key(&entry.collection_name, &entry.id))?;
                removed += 1;
            } else {
                tracing::debug!(
                    collection = %entry.collection_name,
                    id = %entry.id,
                    "keeping change entry replaced since upload"
                );
            }
        }
        Ok(removed)
    }
}

fn decode(value: Value) -> CoreResult<ChangeEntry> {
    serde_json::from_value(value).map_err(|e| CoreError::codec(format!("bad change entry: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use serde_json::json;

    fn create_db() -> Database {
        Database::open("log", &["todos", "notes"], Config::in_memory()).unwrap()
    }

    fn record(db: &Database, entry: ChangeEntry) {
        let mut txn = db
            .transaction(&[CHANGES_STORE], TransactionMode::ReadWrite)
            .unwrap();
        ChangeLog::record(&mut txn, &entry).unwrap();
        txn.commit().unwrap();
    }

    #[test]
    fn new_entry_replaces_previous() {
        let db = create_db();
        record(&db, ChangeEntry::update("todos", "a".into(), json!({"id": "a", "v": 1})));
        record(&db, ChangeEntry::delete("todos", "a".into()));

        let pending = ChangeLog::pending(&db).unwrap();
        assert_eq!(pending, vec![ChangeEntry::delete("todos", "a".into())]);
    }

    #[test]
    fn same_id_in_two_collections_does_not_collide() {
        let db = create_db();
        record(&db, ChangeEntry::update("todos", "1".into(), json!({"id": "1"})));
        record(&db, ChangeEntry::update("notes", "1".into(), json!({"id": "1"})));

        assert_eq!(ChangeLog::pending(&db).unwrap().len(), 2);
        let notes = ChangeLog::pending_in(&db, &["notes"]).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].collection_name, "notes");
    }

    #[test]
    fn acknowledge_removes_unchanged_entries() {
        let db = create_db();
        record(&db, ChangeEntry::update("todos", "a".into(), json!({"id": "a"})));
        record(&db, ChangeEntry::update("todos", "b".into(), json!({"id": "b"})));
        let sent = ChangeLog::pending(&db).unwrap();

        // "b" changes again while the batch is in flight
        record(&db, ChangeEntry::update("todos", "b".into(), json!({"id": "b", "v": 2})));

        let mut txn = db
            .transaction(&[CHANGES_STORE], TransactionMode::ReadWrite)
            .unwrap();
        let removed = ChangeLog::acknowledge(&mut txn, &sent, &["a".into(), "b".into()]).unwrap();
        txn.commit().unwrap();

        assert_eq!(removed, 1);
        let pending = ChangeLog::pending(&db).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].change_set, Some(json!({"id": "b", "v": 2})));
    }

    #[test]
    fn acknowledge_ignores_unknown_ids() {
        let db = create_db();
        record(&db, ChangeEntry::update("todos", "a".into(), json!({"id": "a"})));
        let sent = ChangeLog::pending(&db).unwrap();

        let mut txn = db
            .transaction(&[CHANGES_STORE], TransactionMode::ReadWrite)
            .unwrap();
        assert_eq!(ChangeLog::acknowledge(&mut txn, &sent, &["zzz".into()]).unwrap(), 0);
    }
}
