//! Durable local state.
//!
//! Small string values that live outside the document store, such as the
//! download watermark or a persisted sync context.

use crate::error::{CoreError, CoreResult};
use offsync_sync_protocol::{Watermark, LAST_UPDATE_TS};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// A durable string key/value map.
pub trait LocalState: Send + Sync {
    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be read.
    fn get(&self, key: &str) -> CoreResult<Option<String>>;

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be written.
    fn set(&self, key: &str, value: &str) -> CoreResult<()>;

    /// Removes `key`. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be written.
    fn remove(&self, key: &str) -> CoreResult<()>;
}

/// Local state kept in memory, for tests.
#[derive(Debug, Default)]
pub struct MemoryLocalState {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryLocalState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalState for MemoryLocalState {
    fn get(&self, key: &str) -> CoreResult<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> CoreResult<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> CoreResult<()> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// Local state stored as a JSON object in a single file.
///
/// Every write replaces the file through a temporary sibling and a rename,
/// so a crash leaves either the old or the new contents.
#[derive(Debug)]
pub struct FileLocalState {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileLocalState {
    /// Opens the state file at `path`, starting empty if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            serde_json::from_slice(&fs::read(&path)?)?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> CoreResult<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(values)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl LocalState for FileLocalState {
    fn get(&self, key: &str) -> CoreResult<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> CoreResult<()> {
        let mut values = self.values.lock();
        let mut next = values.clone();
        next.insert(key.to_string(), value.to_string());
        self.persist(&next)?;
        *values = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> CoreResult<()> {
        let mut values = self.values.lock();
        if !values.contains_key(key) {
            return Ok(());
        }
        let mut next = values.clone();
        next.remove(key);
        self.persist(&next)?;
        *values = next;
        Ok(())
    }
}

/// Reads the download watermark.
///
/// # Errors
///
/// Returns an error if the state cannot be read or holds a value that is
/// not a watermark.
pub fn load_watermark(state: &dyn LocalState) -> CoreResult<Option<Watermark>> {
    state
        .get(LAST_UPDATE_TS)?
        .map(|raw| {
            raw.parse::<u64>()
                .map(Watermark)
                .map_err(|_| CoreError::codec(format!("invalid watermark {raw:?}")))
        })
        .transpose()
}

/// Persists the download watermark.
///
/// The watermark never moves backwards: a value older than the stored one
/// is ignored. Returns the watermark in effect afterwards.
///
/// # Errors
///
/// Returns an error if the state cannot be read or written.
pub fn store_watermark(state: &dyn LocalState, mark: Watermark) -> CoreResult<Watermark> {
    if let Some(current) = load_watermark(state)? {
        if current > mark {
            tracing::debug!(%current, ignored = %mark, "keeping newer watermark");
            return Ok(current);
        }
    }
    state.set(LAST_UPDATE_TS, &mark.to_string())?;
    Ok(mark)
}
