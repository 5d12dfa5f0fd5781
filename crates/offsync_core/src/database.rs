//! The document store.

use crate::change_log::CHANGES_STORE;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::log_record::{LogRecord, LoggedWrite};
use crate::transaction::Transaction;
use crate::types::{Key, TransactionId, TransactionMode};
use offsync_storage::{FileBackend, InMemoryBackend, StorageBackend};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Contents of one store, ordered by key.
pub(crate) type StoreData = BTreeMap<Key, Value>;

/// A named document store made of named object stores.
///
/// `Database` is a cheap handle: clones share the same stores and log.
/// Every store holds JSON records ordered by [`Key`]. Committed transactions
/// are appended to a [`StorageBackend`] and replayed when the database is
/// opened again.
///
/// The changes store (`changesDBStore`) always exists, whatever store names
/// the caller asks for.
///
/// # Example
///
/// ```rust
/// use offsync_core::{Config, Database, TransactionMode};
/// use serde_json::json;
///
/// let db = Database::open("app", &["todos"], Config::in_memory()).unwrap();
///
/// let mut txn = db.transaction(&["todos"], TransactionMode::ReadWrite).unwrap();
/// txn.put_record("todos", json!({"id": "t1", "title": "milk"})).unwrap();
/// txn.commit().unwrap();
///
/// let txn = db.transaction(&["todos"], TransactionMode::ReadOnly).unwrap();
/// assert!(txn.get("todos", &"t1".into()).unwrap().is_some());
/// ```
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

struct DatabaseInner {
    name: String,
    config: Config,
    stores: RwLock<BTreeMap<String, StoreData>>,
    backend: Mutex<Box<dyn StorageBackend>>,
    next_txn: AtomicU64,
    /// Held for the lifetime of a file-backed database.
    _lock: Option<File>,
}

impl Database {
    /// Opens the database `name`, creating any of `store_names` that do
    /// not exist yet.
    ///
    /// With `config.path` set the database lives in `<path>/<name>.log`
    /// and is locked through `<path>/<name>.lock` until the last handle is
    /// dropped; otherwise it is kept in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be opened or replayed,
    /// [`CoreError::DatabaseNotFound`] when the log is missing and
    /// `create_if_missing` is off, or [`CoreError::DatabaseLocked`] when
    /// the database is already open elsewhere.
    pub fn open(name: &str, store_names: &[&str], config: Config) -> CoreResult<Self> {
        let (Some(path), Some(lock_path)) = (config.log_path(name), config.lock_path(name)) else {
            return Self::open_inner(name, store_names, config, Box::new(InMemoryBackend::new()), None);
        };
        if !config.create_if_missing && !path.exists() {
            return Err(CoreError::DatabaseNotFound { path });
        }
        let lock = acquire_lock(&lock_path)?;
        let backend = Box::new(FileBackend::open_with_create_dirs(&path)?);
        Self::open_inner(name, store_names, config, backend, Some(lock))
    }

    /// Opens a database on top of an existing backend.
    ///
    /// Useful for tests that need to share or inspect the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be replayed or the new stores
    /// cannot be recorded.
    pub fn open_with_backend(
        name: &str,
        store_names: &[&str],
        config: Config,
        backend: Box<dyn StorageBackend>,
    ) -> CoreResult<Self> {
        Self::open_inner(name, store_names, config, backend, None)
    }

    fn open_inner(
        name: &str,
        store_names: &[&str],
        config: Config,
        mut backend: Box<dyn StorageBackend>,
        lock: Option<File>,
    ) -> CoreResult<Self> {
        let (stores, last_txn) = replay(backend.as_ref())?;
        let mut stores = stores;

        let mut missing: Vec<String> = store_names
            .iter()
            .copied()
            .chain(std::iter::once(CHANGES_STORE))
            .filter(|n| !stores.contains_key(*n))
            .map(str::to_string)
            .collect();
        missing.sort();
        missing.dedup();

        if !missing.is_empty() {
            backend.append(&LogRecord::CreateStores { names: missing.clone() }.encode()?)?;
            if config.sync_on_commit {
                backend.sync()?;
            }
            for store in &missing {
                stores.insert(store.clone(), StoreData::new());
            }
            tracing::info!(database = name, stores = ?missing, "created stores");
        }

        let db = Self {
            inner: Arc::new(DatabaseInner {
                name: name.to_string(),
                config,
                stores: RwLock::new(stores),
                backend: Mutex::new(backend),
                next_txn: AtomicU64::new(last_txn + 1),
                _lock: lock,
            }),
        };
        db.maybe_compact()?;
        tracing::debug!(database = name, "opened");
        Ok(db)
    }

    /// Returns the database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Returns true if the store exists.
    #[must_use]
    pub fn has_store(&self, name: &str) -> bool {
        self.inner.stores.read().contains_key(name)
    }

    /// Returns the names of every store, sorted.
    #[must_use]
    pub fn store_names(&self) -> Vec<String> {
        self.inner.stores.read().keys().cloned().collect()
    }

    /// Begins a transaction over `store_names`.
    ///
    /// Only the named stores can be touched by the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreNotFound`] if a named store does not exist,
    /// or [`CoreError::InvalidArgument`] if no store is named.
    pub fn transaction(&self, store_names: &[&str], mode: TransactionMode) -> CoreResult<Transaction> {
        if store_names.is_empty() {
            return Err(CoreError::invalid_argument("transaction scope is empty"));
        }
        {
            let stores = self.inner.stores.read();
            if let Some(missing) = store_names.iter().find(|n| !stores.contains_key(**n)) {
                return Err(CoreError::store_not_found(*missing));
            }
        }
        let id = TransactionId::new(self.inner.next_txn.fetch_add(1, Ordering::SeqCst));
        Ok(Transaction::new(self.clone(), id, mode, store_names))
    }

    /// Rewrites the log as a single snapshot of the current contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot could not be written. The previous
    /// log remains valid in that case.
    pub fn compact(&self) -> CoreResult<()> {
        let mut backend = self.inner.backend.lock();
        let stores = self.inner.stores.read();
        let snapshot = LogRecord::Snapshot {
            stores: stores
                .iter()
                .map(|(name, data)| {
                    let records = data.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                    (name.clone(), records)
                })
                .collect(),
        };
        let last_txn = self.inner.next_txn.load(Ordering::SeqCst).saturating_sub(1);
        let marker = LogRecord::Commit {
            txn: last_txn,
            writes: Vec::new(),
        };
        backend.rewrite(&[snapshot.encode()?, marker.encode()?])?;
        backend.sync()?;
        tracing::info!(database = %self.inner.name, "compacted log");
        Ok(())
    }

    pub(crate) fn read_record(&self, store: &str, key: &Key) -> Option<Value> {
        self.inner
            .stores
            .read()
            .get(store)
            .and_then(|data| data.get(key).cloned())
    }

    pub(crate) fn read_store(&self, store: &str) -> StoreData {
        self.inner
            .stores
            .read()
            .get(store)
            .cloned()
            .unwrap_or_default()
    }

    /// Makes `writes` durable and visible as one unit.
    pub(crate) fn apply_commit(&self, txn: TransactionId, writes: Vec<LoggedWrite>) -> CoreResult<()> {
        let record = LogRecord::Commit {
            txn: txn.as_u64(),
            writes,
        };
        let bytes = record.encode()?;
        {
            let mut backend = self.inner.backend.lock();
            let position = backend.append(&bytes)?;
            if self.inner.config.sync_on_commit {
                if let Err(e) = backend.sync() {
                    // An unsynced frame must not be replayed on the next open
                    if let Err(rollback) = backend.truncate(position) {
                        tracing::error!(
                            database = %self.inner.name,
                            %txn,
                            error = %rollback,
                            "could not roll back unsynced commit"
                        );
                    }
                    return Err(e.into());
                }
            }
            if let LogRecord::Commit { writes, .. } = record {
                apply_writes(&mut self.inner.stores.write(), writes);
            }
        }
        tracing::debug!(database = %self.inner.name, %txn, "committed");

        if let Err(e) = self.maybe_compact() {
            tracing::warn!(database = %self.inner.name, error = %e, "compaction failed");
        }
        Ok(())
    }

    fn maybe_compact(&self) -> CoreResult<()> {
        let threshold = self.inner.config.compact_threshold;
        if threshold == 0 {
            return Ok(());
        }
        let len = self.inner.backend.lock().len()?;
        if len > threshold {
            self.compact()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.inner.name)
            .field("stores", &self.store_names())
            .finish_non_exhaustive()
    }
}

fn apply_writes(stores: &mut BTreeMap<String, StoreData>, writes: Vec<LoggedWrite>) {
    for write in writes {
        match write {
            LoggedWrite::Put { store, key, value } => {
                stores.entry(store).or_default().insert(key, value);
            }
            LoggedWrite::Delete { store, key } => {
                if let Some(data) = stores.get_mut(&store) {
                    data.remove(&key);
                }
            }
        }
    }
}

/// Takes the exclusive lock of a file-backed database.
fn acquire_lock(path: &Path) -> CoreResult<File> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    if file.try_lock_exclusive().is_err() {
        return Err(CoreError::DatabaseLocked {
            path: path.to_path_buf(),
        });
    }
    Ok(file)
}

fn replay(backend: &dyn StorageBackend) -> CoreResult<(BTreeMap<String, StoreData>, u64)> {
    let mut stores = BTreeMap::new();
    let mut last_txn = 0;
    for bytes in backend.read_all()? {
        match LogRecord::decode(&bytes)? {
            LogRecord::CreateStores { names } => {
                for name in names {
                    stores.entry(name).or_insert_with(StoreData::new);
                }
            }
            LogRecord::Commit { txn, writes } => {
                last_txn = last_txn.max(txn);
                apply_writes(&mut stores, writes);
            }
            LogRecord::Snapshot { stores: snapshot } => {
                stores = snapshot
                    .into_iter()
                    .map(|(name, records)| (name, records.into_iter().collect()))
                    .collect();
            }
        }
    }
    Ok((stores, last_txn))
}
