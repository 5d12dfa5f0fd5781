//! Collection stores.

use crate::change_log::{ChangeLog, CHANGES_STORE};
use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::id::generate_id;
use crate::types::{Key, TransactionMode, KEY_PATH};
use offsync_sync_protocol::{ChangeEntry, RecordId};
use serde_json::Value;

/// A named collection of JSON records whose mutations are tracked.
///
/// Every `save` and `remove` writes the record and its change entry in one
/// read-write transaction over the collection and the changes store: either
/// both become visible or neither does.
///
/// # Example
///
/// ```rust
/// use offsync_core::{Collection, Config, Database};
/// use serde_json::json;
///
/// let db = Database::open("app", &["todos"], Config::in_memory()).unwrap();
/// let todos = Collection::new(&db, "todos").unwrap();
///
/// let id = todos.save(json!({"title": "milk"})).unwrap();
/// todos.remove(&id).unwrap();
/// assert!(todos.get_one(&id).unwrap().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct Collection {
    db: Database,
    name: String,
}

impl Collection {
    /// Creates a handle on the collection `name` of `db`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CollectionNotFound`] if `db` has no store named
    /// `name` or lacks the changes store.
    pub fn new(db: &Database, name: &str) -> CoreResult<Self> {
        if name == CHANGES_STORE || !db.has_store(name) {
            return Err(CoreError::CollectionNotFound {
                name: name.to_string(),
            });
        }
        if !db.has_store(CHANGES_STORE) {
            return Err(CoreError::CollectionNotFound {
                name: CHANGES_STORE.to_string(),
            });
        }
        Ok(Self {
            db: db.clone(),
            name: name.to_string(),
        })
    }

    /// Returns the collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stores `data` and records an UPDATE change entry for it.
    ///
    /// A record without an `id` (or with a null one) is given a generated
    /// id. Returns the id the record was stored under.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if `data` is null or not an
    /// object, and a storage error if the transaction fails. Nothing is
    /// committed on failure.
    pub fn save(&self, data: Value) -> CoreResult<RecordId> {
        let mut data = match data {
            Value::Null => return Err(CoreError::invalid_argument("data is undefined")),
            Value::Object(map) => map,
            _ => return Err(CoreError::invalid_argument("data must be an object")),
        };
        if data.get(KEY_PATH).map_or(true, Value::is_null) {
            data.insert(KEY_PATH.to_string(), Value::String(generate_id().to_string()));
        }
        let record = Value::Object(data);

        let mut txn = self
            .db
            .transaction(&[CHANGES_STORE, self.name.as_str()], TransactionMode::ReadWrite)?;
        let id = txn.put_record(&self.name, record.clone())?;
        ChangeLog::record(&mut txn, &ChangeEntry::update(&self.name, id.clone(), record))?;
        txn.commit()?;

        tracing::debug!(collection = %self.name, %id, "saved");
        Ok(id)
    }

    /// Deletes the record `id` and records a DELETE change entry.
    ///
    /// Removing an absent record still records the deletion.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the transaction fails. Nothing is
    /// committed on failure.
    pub fn remove(&self, id: &RecordId) -> CoreResult<()> {
        let mut txn = self
            .db
            .transaction(&[CHANGES_STORE, self.name.as_str()], TransactionMode::ReadWrite)?;
        txn.delete(&self.name, &Key::from(id))?;
        ChangeLog::record(&mut txn, &ChangeEntry::delete(&self.name, id.clone()))?;
        txn.commit()?;

        tracing::debug!(collection = %self.name, %id, "removed");
        Ok(())
    }

    /// Returns every record in id order.
    ///
    /// The sequence reflects the collection when `get_all` was called. Call
    /// again to start over.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the collection cannot be read.
    pub fn get_all(&self) -> CoreResult<Records> {
        let txn = self
            .db
            .transaction(&[self.name.as_str()], TransactionMode::ReadOnly)?;
        let records = txn.get_all(&self.name)?;
        Ok(Records {
            inner: records.into_iter(),
        })
    }

    /// Returns the record `id`, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the collection cannot be read.
    pub fn get_one(&self, id: &RecordId) -> CoreResult<Option<Value>> {
        let txn = self
            .db
            .transaction(&[self.name.as_str()], TransactionMode::ReadOnly)?;
        txn.get(&self.name, &Key::from(id))
    }
}

/// Iterator over the records of a collection, in id order.
#[derive(Debug)]
pub struct Records {
    inner: std::vec::IntoIter<(Key, Value)>,
}

impl Iterator for Records {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        self.inner.next().map(|(_, value)| value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Records {}
