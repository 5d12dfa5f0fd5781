//! In-memory storage backend for testing.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An in-memory record log.
///
/// This backend keeps every record in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral databases that don't need persistence
///
/// Clones share the same log, so a test can "reopen" a database by handing
/// a clone of the backend to a second `Database`.
///
/// # Example
///
/// ```rust
/// use offsync_storage::{InMemoryBackend, StorageBackend};
///
/// let mut backend = InMemoryBackend::new();
/// assert_eq!(backend.append(b"commit").unwrap(), 0);
/// assert_eq!(backend.len().unwrap(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    records: Arc<RwLock<Vec<Vec<u8>>>>,
    fail_writes: Arc<AtomicBool>,
    fail_sync: Arc<AtomicBool>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend with pre-existing records.
    ///
    /// Useful for testing replay.
    #[must_use]
    pub fn with_records(records: Vec<Vec<u8>>) -> Self {
        Self {
            records: Arc::new(RwLock::new(records)),
            fail_writes: Arc::new(AtomicBool::new(false)),
            fail_sync: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns a copy of all records.
    #[must_use]
    pub fn records(&self) -> Vec<Vec<u8>> {
        self.records.read().clone()
    }

    /// Makes every subsequent `append` and `rewrite` fail until reset.
    ///
    /// Useful for testing commit failures.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `sync` fail until reset. Appends still succeed.
    pub fn fail_sync(&self, fail: bool) {
        self.fail_sync.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteRejected(
                "in-memory backend is failing writes".into(),
            ));
        }
        Ok(())
    }
}

impl StorageBackend for InMemoryBackend {
    fn append(&mut self, record: &[u8]) -> StorageResult<u64> {
        self.check_writable()?;
        let mut records = self.records.write();
        records.push(record.to_vec());
        Ok(records.len() as u64 - 1)
    }

    fn read_all(&self) -> StorageResult<Vec<Vec<u8>>> {
        Ok(self.records.read().clone())
    }

    fn rewrite(&mut self, records: &[Vec<u8>]) -> StorageResult<()> {
        self.check_writable()?;
        *self.records.write() = records.to_vec();
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> StorageResult<()> {
        let len = usize::try_from(len).unwrap_or(usize::MAX);
        self.records.write().truncate(len);
        Ok(())
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.records.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.fail_sync.load(Ordering::SeqCst) {
            return Err(StorageError::WriteRejected(
                "in-memory backend is failing sync".into(),
            ));
        }
        // Nothing to make durable
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let backend = InMemoryBackend::new();
        assert!(backend.is_empty().unwrap());
        assert!(backend.records().is_empty());
    }

    #[test]
    fn memory_append_returns_position() {
        let mut backend = InMemoryBackend::new();
        assert_eq!(backend.append(b"a").unwrap(), 0);
        assert_eq!(backend.append(b"b").unwrap(), 1);
        assert_eq!(backend.len().unwrap(), 2);
    }

    #[test]
    fn memory_read_all_in_append_order() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"one").unwrap();
        backend.append(b"two").unwrap();

        let records = backend.read_all().unwrap();
        assert_eq!(records, vec![b"one".to_vec(), b"two".to_vec()]);

        // Restartable
        assert_eq!(backend.read_all().unwrap(), records);
    }

    #[test]
    fn memory_clones_share_the_log() {
        let mut backend = InMemoryBackend::new();
        let reopened = backend.clone();
        backend.append(b"shared").unwrap();
        assert_eq!(reopened.read_all().unwrap(), vec![b"shared".to_vec()]);
    }

    #[test]
    fn memory_rewrite_replaces_contents() {
        let mut backend = InMemoryBackend::with_records(vec![b"x".to_vec(), b"y".to_vec()]);
        backend.rewrite(&[b"snapshot".to_vec()]).unwrap();
        assert_eq!(backend.read_all().unwrap(), vec![b"snapshot".to_vec()]);
    }

    #[test]
    fn memory_failing_writes_leave_log_untouched() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"kept").unwrap();
        backend.fail_writes(true);

        assert!(matches!(
            backend.append(b"lost"),
            Err(StorageError::WriteRejected(_))
        ));
        assert!(backend.rewrite(&[]).is_err());
        assert_eq!(backend.read_all().unwrap(), vec![b"kept".to_vec()]);

        backend.fail_writes(false);
        assert_eq!(backend.append(b"again").unwrap(), 1);
    }

    #[test]
    fn memory_truncate_drops_tail() {
        let mut backend = InMemoryBackend::with_records(vec![b"a".to_vec(), b"b".to_vec()]);
        backend.truncate(5).unwrap();
        assert_eq!(backend.len().unwrap(), 2);

        backend.truncate(1).unwrap();
        assert_eq!(backend.read_all().unwrap(), vec![b"a".to_vec()]);
    }

    #[test]
    fn memory_failing_sync_keeps_appends() {
        let mut backend = InMemoryBackend::new();
        backend.fail_sync(true);
        backend.append(b"unsynced").unwrap();
        assert!(matches!(backend.sync(), Err(StorageError::WriteRejected(_))));
        assert_eq!(backend.len().unwrap(), 1);

        backend.fail_sync(false);
        backend.sync().unwrap();
    }

    #[test]
    fn memory_empty_record() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"").unwrap();
        assert_eq!(backend.read_all().unwrap(), vec![Vec::<u8>::new()]);
    }
}
