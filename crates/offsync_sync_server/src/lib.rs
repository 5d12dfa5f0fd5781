//! # offsync Sync Server
//!
//! Reference sync server for offsync.
//!
//! This crate provides:
//! - Upload and download endpoints for the one-shot coordinators
//! - The poll endpoint, issuing client identities and relaying changes
//!   between clients
//! - An in-memory change store with monotonically increasing revisions
//!
//! # Protocol
//!
//! Uploads are acknowledged in full and answered with the store's revision
//! as the client's new watermark. Downloads return every change newer than
//! the watermark for the requested collections.
//!
//! A poll round records the client's changes and returns the changes other
//! clients made since the client's `syncedRevision`. The first round of a
//! client has no identity; the server issues one in its answer. Rounds the
//! server cannot accept get `success: false`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod server;
mod store;

pub use config::{ServerConfig, POLL_PATH};
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use server::{Reply, SyncServer};
pub use store::{ChangeBatch, ChangeFilter, ChangeStore, StoredChange};
