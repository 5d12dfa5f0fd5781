//! Database configuration.

use std::path::{Path, PathBuf};

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the database log. `None` keeps the database in memory.
    pub path: Option<PathBuf>,

    /// Whether to create the database if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to sync the log on every commit (safer but slower).
    pub sync_on_commit: bool,

    /// Number of log records after which the log is compacted into a
    /// snapshot (0 = never).
    pub compact_threshold: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: None,
            create_if_missing: true,
            sync_on_commit: true,
            compact_threshold: 1000,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for a database that lives only in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Configuration for a database stored under `dir`.
    #[must_use]
    pub fn at(dir: impl AsRef<Path>) -> Self {
        Self {
            path: Some(dir.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to sync the log on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the compaction threshold.
    #[must_use]
    pub const fn compact_threshold(mut self, records: u64) -> Self {
        self.compact_threshold = records;
        self
    }

    /// Returns the log file of the database named `name`, if file-backed.
    #[must_use]
    pub fn log_path(&self, name: &str) -> Option<PathBuf> {
        self.path.as_ref().map(|dir| dir.join(format!("{name}.log")))
    }

    /// Returns the lock file of the database named `name`, if file-backed.
    #[must_use]
    pub fn lock_path(&self, name: &str) -> Option<PathBuf> {
        self.path.as_ref().map(|dir| dir.join(format!("{name}.lock")))
    }
}
