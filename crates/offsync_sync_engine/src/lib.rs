//! # offsync Sync Engine
//!
//! Client side synchronization for offsync databases.
//!
//! This crate provides:
//! - One-shot upload and download coordinators, and [`sync_once`] running
//!   them in sequence
//! - The poll sync protocol (one round per poll)
//! - A connection manager running one poll loop per server url
//! - Connectivity detection and per-url context persistence
//! - HTTP transport abstraction (reqwest or in-process loopback)
//!
//! ## Architecture
//!
//! Local writes go through [`offsync_core::Collection`], which records a
//! change log entry in the same transaction as the write. The coordinators
//! and the poll loop drain that log:
//!
//! 1. Pending entries are sent to the server
//! 2. The server acknowledges them and returns its own changes
//! 3. Remote changes are applied in one transaction
//! 4. Acknowledged entries are removed unless they were replaced meanwhile
//!
//! ## Key Invariants
//!
//! - A round either applies all remote changes or none
//! - Watermarks and revisions never advance past a failed commit
//! - A change recorded while a round is in flight is never lost
//! - A fatal error stops the loop; transient errors are retried

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod connectivity;
mod context;
mod download;
mod error;
mod http;
mod once;
mod protocol;
mod replica;
mod target;
mod upload;

pub use client::{StatusListener, SyncClient, SyncStatus};
pub use config::{SyncConfig, DEFAULT_POLL_INTERVAL};
pub use connectivity::{
    ConnectivityListener, ConnectivityOracle, HttpConnectivityOracle, NetworkMonitor, StaticConnectivity,
    StatusSubscription,
};
pub use context::{ContextPersistence, LocalStatePersistence, SyncContext};
pub use download::{DownloadCoordinator, DownloadReport};
pub use error::{SyncError, SyncResult};
pub use http::{join_url, post_json, HttpClient, HttpResponse, LoopbackClient, LoopbackServer, ReqwestClient};
pub use once::{sync_once, SyncReport};
pub use protocol::{
    Communicator, HttpCommunicator, PollSyncProtocol, ReplicationHost, RetryAfter, RoundInput, RoundOutcome,
    SERVER_ERROR_MESSAGE,
};
pub use replica::ChangeLogReplica;
pub use target::SyncTarget;
pub use upload::{UploadCoordinator, UploadReport};
