//! Storage backend trait definition.

use crate::error::StorageResult;

/// An append-only log of opaque records.
///
/// The document store appends exactly one record per committed transaction.
/// A record that was acknowledged by `append` must be returned by every later
/// `read_all`, in append order, until the log is rewritten.
///
/// # Invariants
///
/// - `append` is all-or-nothing: a failed append leaves no partial record
///   visible to `read_all`
/// - `read_all` is restartable and returns a finite sequence
/// - `rewrite` replaces the log contents as one unit
/// - Backends must be `Send + Sync`
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait StorageBackend: Send + Sync {
    /// Appends one record to the log.
    ///
    /// Returns the zero-based position of the record in the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the record could not be written. In that case the
    /// log is unchanged.
    fn append(&mut self, record: &[u8]) -> StorageResult<u64>;

    /// Reads every record in append order.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read or is corrupted before its
    /// final record.
    fn read_all(&self) -> StorageResult<Vec<Vec<u8>>>;

    /// Replaces the whole log with `records`.
    ///
    /// Used to compact a log of many small commits into a single snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the new contents could not be written. The old
    /// contents remain readable in that case.
    fn rewrite(&mut self, records: &[Vec<u8>]) -> StorageResult<()>;

    /// Drops every record at position `len` and beyond.
    ///
    /// Used to roll back an append whose commit could not be completed.
    /// Truncating to the current length or more is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the log could not be shortened.
    fn truncate(&mut self, len: u64) -> StorageResult<()>;

    /// Returns the number of records in the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the count cannot be determined.
    fn len(&self) -> StorageResult<u64>;

    /// Returns true if the log holds no records.
    ///
    /// # Errors
    ///
    /// Returns an error if the count cannot be determined.
    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Makes every appended record durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;
}
