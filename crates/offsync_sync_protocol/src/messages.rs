//! Protocol messages for sync.

use crate::error::ProtocolResult;
use crate::ids::{ClientIdentity, RecordId, Revision, Watermark};
use crate::operation::ChangeEntry;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Encodes a message as JSON bytes.
///
/// # Errors
///
/// Returns an error if the message cannot be serialized.
pub fn encode<T: Serialize>(message: &T) -> ProtocolResult<Vec<u8>> {
    Ok(serde_json::to_vec(message)?)
}

/// Decodes a message from JSON bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not a valid message of type `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Upload request: every pending change entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRequest {
    /// Pending changes.
    pub changes: Vec<ChangeEntry>,
}

/// Upload acknowledgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// Ids of the accepted changes.
    pub change_ids: Vec<RecordId>,
    /// New download watermark.
    #[serde(rename = "lastUpdateTS")]
    pub last_update_ts: Watermark,
}

/// Download request: changes newer than the watermark for some collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    /// Last watermark received, absent before the first upload.
    #[serde(rename = "lastUpdateTS")]
    pub last_update_ts: Option<Watermark>,
    /// Collections the client is interested in.
    pub collection_names: Vec<String>,
}

/// Download response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadResponse {
    /// Remote changes to apply.
    #[serde(default)]
    pub changes: Vec<ChangeEntry>,
}

/// One poll protocol round sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollRequest {
    /// Identity issued by the server; absent on the very first round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_identity: Option<ClientIdentity>,
    /// Revision the local changes are based on.
    pub base_revision: Option<Revision>,
    /// True when more local changes remain than were sent.
    pub partial: bool,
    /// Local changes.
    pub changes: Vec<ChangeEntry>,
    /// Last server revision the client has applied.
    pub synced_revision: Option<Revision>,
}

/// The server's answer to a poll round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    /// False when the server refused the round.
    pub success: bool,
    /// Reason for a refusal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Identity for a client that did not send one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_identity: Option<ClientIdentity>,
    /// Remote changes.
    #[serde(default)]
    pub changes: Vec<ChangeEntry>,
    /// Server revision after these changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_revision: Option<Revision>,
    /// True when the server holds more changes than it sent.
    #[serde(default)]
    pub partial: bool,
}

impl PollResponse {
    /// Creates a refusal.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
            client_identity: None,
            changes: Vec::new(),
            current_revision: None,
            partial: false,
        }
    }

    /// Creates a successful response.
    pub fn accepted(changes: Vec<ChangeEntry>, current_revision: Revision) -> Self {
        Self {
            success: true,
            error_message: None,
            client_identity: None,
            changes,
            current_revision: Some(current_revision),
            partial: false,
        }
    }

    /// Attaches a newly issued client identity.
    #[must_use]
    pub fn with_client_identity(mut self, identity: ClientIdentity) -> Self {
        self.client_identity = Some(identity);
        self
    }
}
