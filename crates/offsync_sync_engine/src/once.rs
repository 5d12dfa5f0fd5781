//! One-shot upload followed by download.

use crate::config::SyncConfig;
use crate::download::{DownloadCoordinator, DownloadReport};
use crate::error::SyncResult;
use crate::http::HttpClient;
use crate::target::SyncTarget;
use crate::upload::{UploadCoordinator, UploadReport};
use std::sync::Arc;

/// Outcome of [`sync_once`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncReport {
    /// The upload half.
    pub upload: UploadReport,
    /// The download half.
    pub download: DownloadReport,
}

/// Uploads the change log of `target`, then downloads remote changes.
///
/// The download starts only after the upload has committed, so it is made
/// with the watermark the upload produced.
///
/// # Errors
///
/// Returns the upload's error without downloading, or the download's error.
pub async fn sync_once(
    client: Arc<dyn HttpClient>,
    config: &SyncConfig,
    target: &SyncTarget,
    server_url: &str,
) -> SyncResult<SyncReport> {
    let upload = UploadCoordinator::new(Arc::clone(&client), config.clone())
        .upload(target, server_url)
        .await?;
    let download = DownloadCoordinator::new(client, config.clone())
        .download(target, server_url)
        .await?;
    Ok(SyncReport { upload, download })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::http::{HttpResponse, LoopbackClient, LoopbackServer};
    use offsync_core::{Collection, Config, Database, MemoryLocalState};
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    /// Records request paths; fails uploads when asked to.
    struct Recorder {
        paths: Mutex<Vec<String>>,
        fail_upload: bool,
    }

    impl LoopbackServer for Recorder {
        fn handle_post(&self, path: &str, body: &[u8]) -> HttpResponse {
            self.paths.lock().push(path.to_string());
            let request: Value = serde_json::from_slice(body).unwrap();
            let reply = if path.ends_with("upload") {
                if self.fail_upload {
                    return HttpResponse::new(503, Vec::new());
                }
                let ids: Vec<Value> = request["changes"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|c| c["id"].clone())
                    .collect();
                json!({"changeIds": ids, "lastUpdateTS": 7})
            } else {
                assert_eq!(request["lastUpdateTS"], json!(7));
                json!({"changes": [
                    {"operation": "UPDATE", "id": "r1", "collectionName": "todos", "changeSet": {"id": "r1"}}
                ]})
            };
            HttpResponse::new(200, reply.to_string().into_bytes())
        }
    }

    fn setup(fail_upload: bool) -> (SyncTarget, Arc<LoopbackClient<Recorder>>) {
        let db = Database::open("once", &["todos"], Config::in_memory()).unwrap();
        let target = SyncTarget::new(db, &["todos"], Arc::new(MemoryLocalState::new())).unwrap();
        Collection::new(target.db(), "todos")
            .unwrap()
            .save(json!({"id": "l1"}))
            .unwrap();
        let client = Arc::new(LoopbackClient::new(Recorder {
            paths: Mutex::new(Vec::new()),
            fail_upload,
        }));
        (target, client)
    }

    #[tokio::test]
    async fn download_follows_upload() {
        let (target, client) = setup(false);
        let report = sync_once(client.clone(), &SyncConfig::default(), &target, "http://server")
            .await
            .unwrap();

        assert_eq!(report.upload.acknowledged, 1);
        assert_eq!(report.download.applied, 1);
        assert_eq!(*client.server().paths.lock(), ["/api/v1/upload", "/api/v1/download"]);
    }

    #[tokio::test]
    async fn failed_upload_skips_download() {
        let (target, client) = setup(true);
        let err = sync_once(client.clone(), &SyncConfig::default(), &target, "http://server")
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Transport { status: Some(503), .. }));
        assert_eq!(*client.server().paths.lock(), ["/api/v1/upload"]);
    }
}
