//! # offsync core
//!
//! Change-tracking document store for offsync.
//!
//! This crate provides:
//! - A document store ([`Database`]) of named stores holding JSON records
//! - Scoped transactions that are sealed by commit and fail fast afterwards
//! - A durable commit log on top of an `offsync_storage` backend
//! - Collections that write a record and its [`ChangeEntry`] atomically
//! - The change log of pending mutations, keyed by (collection, id)
//! - Durable local state for the download watermark
//!
//! ## Example
//!
//! ```rust
//! use offsync_core::{ChangeLog, Collection, Config, Database};
//! use serde_json::json;
//!
//! let db = Database::open("notes", &["notes"], Config::in_memory()).unwrap();
//! let notes = Collection::new(&db, "notes").unwrap();
//!
//! let id = notes.save(json!({"title": "hello"})).unwrap();
//! assert_eq!(notes.get_one(&id).unwrap().unwrap()["title"], "hello");
//! assert_eq!(ChangeLog::pending(&db).unwrap().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_log;
mod collection;
mod config;
mod database;
mod error;
mod id;
mod local_state;
mod log_record;
mod transaction;
mod types;

pub use change_log::{ChangeLog, CHANGES_STORE};
pub use collection::{Collection, Records};
pub use config::Config;
pub use database::Database;
pub use error::{CoreError, CoreResult};
pub use id::generate_id;
pub use local_state::{
    load_watermark, store_watermark, FileLocalState, LocalState, MemoryLocalState,
};
pub use transaction::{PendingWrite, Transaction, TransactionState};
pub use types::{Key, TransactionId, TransactionMode, KEY_PATH};

pub use offsync_sync_protocol::{ChangeEntry, Operation, RecordId, Watermark};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
