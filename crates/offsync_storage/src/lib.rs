//! # offsync storage
//!
//! Record log backends for the offsync document store.
//!
//! A backend is an **append-only log of opaque records**. The document store
//! in `offsync_core` appends one record per committed transaction and
//! replays the log when a database is opened. Backends never interpret the
//! bytes they store.
//!
//! ## Design Principles
//!
//! - A record is either fully appended or not visible at all
//! - `read_all` returns records in append order
//! - `rewrite` atomically replaces the whole log (used for compaction)
//! - Must be `Send + Sync` so a database can be shared across tasks
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral storage
//! - [`FileBackend`] - For persistent storage using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use offsync_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.append(b"first commit").unwrap();
//! backend.append(b"second commit").unwrap();
//!
//! let records = backend.read_all().unwrap();
//! assert_eq!(records.len(), 2);
//! assert_eq!(records[1], b"second commit");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
