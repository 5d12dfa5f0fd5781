//! File-based storage backend for persistent storage.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Frame header: record length (u32 LE) followed by checksum (u32 LE).
const HEADER_LEN: usize = 8;

/// A file-based record log.
///
/// Each record is stored as a frame: `[len: u32][checksum: u32][bytes]`.
/// A frame that was only partly written when the process died is detected
/// on open and cut off, so a torn commit never becomes visible.
///
/// # Durability
///
/// - `append` writes the whole frame with one `write_all`
/// - `sync()` calls `File::sync_all()` to ensure data is on disk
/// - `rewrite` writes a sibling file, syncs it, and renames it into place
///
/// # Example
///
/// ```no_run
/// use offsync_storage::{FileBackend, StorageBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("app.offsync")).unwrap();
/// backend.append(b"commit").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: RwLock<File>,
    /// Number of complete frames.
    count: RwLock<u64>,
    /// Set when a failed append left bytes that could not be cut off.
    poisoned: bool,
}

impl FileBackend {
    /// Opens or creates a log file at the given path.
    ///
    /// A torn final frame is truncated away.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, or if a frame other
    /// than the last one is damaged.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut bytes = Vec::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut bytes)?;

        let (records, valid_len) = decode_frames(&bytes)?;
        if valid_len < bytes.len() as u64 {
            warn!(
                path = %path.display(),
                dropped = bytes.len() as u64 - valid_len,
                "truncating torn record at end of log"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            count: RwLock::new(records.len() as u64),
            poisoned: false,
        })
    }

    /// Opens or creates a log file, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or file cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn append(&mut self, record: &[u8]) -> StorageResult<u64> {
        if self.poisoned {
            return Err(StorageError::Poisoned);
        }
        let frame = encode_frame(record)?;

        let mut file = self.file.write();
        let mut count = self.count.write();

        let end = file.seek(SeekFrom::End(0))?;
        if let Err(e) = file.write_all(&frame) {
            // Drop whatever part of the frame made it out
            if let Err(rollback) = file.set_len(end) {
                warn!(
                    path = %self.path.display(),
                    error = %rollback,
                    "could not cut off partial frame, refusing further appends"
                );
                self.poisoned = true;
            }
            return Err(e.into());
        }

        let position = *count;
        *count += 1;
        Ok(position)
    }

    fn read_all(&self) -> StorageResult<Vec<Vec<u8>>> {
        let mut file = self.file.write();
        file.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let (records, _) = decode_frames(&bytes)?;
        Ok(records)
    }

    fn rewrite(&mut self, records: &[Vec<u8>]) -> StorageResult<()> {
        let mut bytes = Vec::new();
        for record in records {
            bytes.extend_from_slice(&encode_frame(record)?);
        }

        let tmp_path = self.path.with_extension("rewrite");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&bytes)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        let reopened = OpenOptions::new().read(true).write(true).open(&self.path)?;
        *self.file.write() = reopened;
        *self.count.write() = records.len() as u64;
        self.poisoned = false;
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> StorageResult<()> {
        let mut file = self.file.write();
        let mut count = self.count.write();
        if len >= *count && !self.poisoned {
            return Ok(());
        }

        file.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let (records, _) = decode_frames(&bytes)?;

        let kept = records.len().min(usize::try_from(len).unwrap_or(usize::MAX));
        let end: u64 = records[..kept]
            .iter()
            .map(|r| (HEADER_LEN + r.len()) as u64)
            .sum();
        file.set_len(end)?;
        file.sync_all()?;

        *count = kept as u64;
        self.poisoned = false;
        Ok(())
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(*self.count.read())
    }

    fn sync(&mut self) -> StorageResult<()> {
        let file = self.file.write();
        file.sync_all()?;
        Ok(())
    }
}

fn encode_frame(record: &[u8]) -> StorageResult<Vec<u8>> {
    let len = u32::try_from(record.len())
        .map_err(|_| StorageError::RecordTooLarge { len: record.len() })?;

    let mut frame = Vec::with_capacity(HEADER_LEN + record.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&checksum(record).to_le_bytes());
    frame.extend_from_slice(record);
    Ok(frame)
}

/// Decodes frames, returning the records and the length of the valid prefix.
///
/// An incomplete or damaged final frame ends the valid prefix; damage
/// followed by further bytes is corruption.
fn decode_frames(bytes: &[u8]) -> StorageResult<(Vec<Vec<u8>>, u64)> {
    let mut records = Vec::new();
    let mut pos = 0usize;

    while pos < bytes.len() {
        let remaining = bytes.len() - pos;
        if remaining < HEADER_LEN {
            break;
        }

        let len = read_u32(&bytes[pos..pos + 4]) as usize;
        let sum = read_u32(&bytes[pos + 4..pos + 8]);
        let start = pos + HEADER_LEN;
        let end = start.saturating_add(len);

        if end > bytes.len() {
            break;
        }

        let record = &bytes[start..end];
        if checksum(record) != sum {
            if end == bytes.len() {
                break;
            }
            return Err(StorageError::corrupted(pos as u64, "checksum mismatch"));
        }

        records.push(record.to_vec());
        pos = end;
    }

    Ok((records, pos as u64))
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

/// FNV-1a over the record bytes.
fn checksum(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in bytes {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.log");

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.len().unwrap(), 0);
        assert!(path.exists());
    }

    #[test]
    fn file_append_and_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.log");

        let mut backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b"world").unwrap(), 1);

        let records = backend.read_all().unwrap();
        assert_eq!(records, vec![b"hello".to_vec(), b"world".to_vec()]);
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.log");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"persistent data").unwrap();
            backend.sync().unwrap();
        }

        {
            let backend = FileBackend::open(&path).unwrap();
            assert_eq!(backend.len().unwrap(), 1);
            assert_eq!(backend.read_all().unwrap(), vec![b"persistent data".to_vec()]);
        }
    }

    #[test]
    fn file_torn_tail_is_truncated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.log");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"complete").unwrap();
            backend.sync().unwrap();
        }

        // Simulate a crash in the middle of writing a second frame
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            let frame = encode_frame(b"torn record").unwrap();
            file.write_all(&frame[..frame.len() - 3]).unwrap();
        }

        let mut backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.read_all().unwrap(), vec![b"complete".to_vec()]);

        // The log keeps working after recovery
        assert_eq!(backend.append(b"next").unwrap(), 1);
        assert_eq!(backend.read_all().unwrap().len(), 2);
    }

    #[test]
    fn file_corruption_before_tail_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.log");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"first").unwrap();
            backend.append(b"second").unwrap();
            backend.sync().unwrap();
        }

        let mut bytes = fs::read(&path).unwrap();
        bytes[HEADER_LEN] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        let result = FileBackend::open(&path);
        assert!(matches!(result, Err(StorageError::Corrupted { offset: 0, .. })));
    }

    #[test]
    fn file_rewrite_replaces_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.log");

        let mut backend = FileBackend::open(&path).unwrap();
        for i in 0..5u8 {
            backend.append(&[i]).unwrap();
        }
        backend.rewrite(&[b"snapshot".to_vec()]).unwrap();
        assert_eq!(backend.len().unwrap(), 1);
        assert_eq!(backend.append(b"after").unwrap(), 1);

        drop(backend);
        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(
            backend.read_all().unwrap(),
            vec![b"snapshot".to_vec(), b"after".to_vec()]
        );
    }

    #[test]
    fn file_truncate_drops_tail_frames() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.log");

        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"kept").unwrap();
        backend.append(b"rolled back").unwrap();
        backend.truncate(1).unwrap();
        assert_eq!(backend.len().unwrap(), 1);
        assert_eq!(backend.append(b"next").unwrap(), 1);

        drop(backend);
        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(
            backend.read_all().unwrap(),
            vec![b"kept".to_vec(), b"next".to_vec()]
        );
    }

    #[test]
    fn file_unrecoverable_append_refuses_more_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.log");

        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"first").unwrap();

        // A read-only handle fails both the write and the rollback
        *backend.file.write() = File::open(&path).unwrap();
        assert!(matches!(backend.append(b"lost"), Err(StorageError::Io(_))));

        *backend.file.write() = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        assert!(matches!(backend.append(b"after"), Err(StorageError::Poisoned)));

        // Truncating back to the known frames recovers the log
        backend.truncate(1).unwrap();
        assert_eq!(backend.append(b"after").unwrap(), 1);

        drop(backend);
        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(
            backend.read_all().unwrap(),
            vec![b"first".to_vec(), b"after".to_vec()]
        );
    }

    #[test]
    fn file_create_with_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("path").join("test.log");

        let backend = FileBackend::open_with_create_dirs(&path).unwrap();
        assert_eq!(backend.len().unwrap(), 0);
        assert_eq!(backend.path(), path);
    }

    #[test]
    fn checksum_differs_for_different_bytes() {
        assert_ne!(checksum(b"abc"), checksum(b"abd"));
        assert_eq!(checksum(b""), 0x811c_9dc5);
    }
}
