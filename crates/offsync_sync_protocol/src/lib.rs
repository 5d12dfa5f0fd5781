//! # offsync sync protocol
//!
//! Sync protocol types and JSON codecs for offsync.
//!
//! This crate provides:
//! - [`ChangeEntry`] and [`Operation`] for pending mutations
//! - Identifiers: [`RecordId`], [`ClientIdentity`], [`Watermark`], [`Revision`]
//! - Coordinator messages (upload, download)
//! - Poll protocol round messages
//! - JSON encoding/decoding
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod ids;
mod messages;
mod operation;

pub use error::{ProtocolError, ProtocolResult};
pub use ids::{ClientIdentity, RecordId, Revision, Watermark};
pub use messages::{
    decode, encode, DownloadRequest, DownloadResponse, PollRequest, PollResponse, UploadRequest,
    UploadResponse,
};
pub use operation::{ChangeEntry, Mutation, Operation};

/// Path of the upload endpoint, relative to the server url.
pub const UPLOAD_PATH: &str = "/api/v1/upload";

/// Path of the download endpoint, relative to the server url.
pub const DOWNLOAD_PATH: &str = "/api/v1/download";

/// Path appended to the server url for connectivity probes.
pub const CHECK_PATH: &str = "check";

/// Well-known local-state key holding the download watermark.
pub const LAST_UPDATE_TS: &str = "lastUpdateTS";
