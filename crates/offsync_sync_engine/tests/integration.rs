//! Integration tests for the sync engine against the reference server.

use offsync_core::{load_watermark, ChangeLog, Config, Database, FileLocalState, LocalState, MemoryLocalState};
use offsync_sync_engine::{
    DownloadCoordinator, HttpClient, HttpResponse, LoopbackClient, LoopbackServer, NetworkMonitor, SyncClient,
    SyncConfig, SyncError, SyncStatus, SyncTarget, UploadCoordinator,
};
use offsync_sync_protocol::{RecordId, Watermark};
use offsync_sync_server::{ServerConfig, SyncServer};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const SERVER: &str = "http://sync.test";
const POLL_URL: &str = "http://sync.test/api/v1/poll";

/// Serves loopback requests from an in-process server.
#[derive(Clone)]
struct InProcess(Arc<SyncServer>);

impl LoopbackServer for InProcess {
    fn handle_post(&self, path: &str, body: &[u8]) -> HttpResponse {
        let reply = self.0.handle_post(path, body);
        HttpResponse::new(reply.status, reply.body)
    }

    fn handle_head(&self, path: &str) -> u16 {
        self.0.handle_head(path)
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn network(server: &Arc<SyncServer>) -> Arc<LoopbackClient<InProcess>> {
    Arc::new(LoopbackClient::new(InProcess(Arc::clone(server))))
}

fn device(name: &str) -> SyncTarget {
    let db = Database::open(name, &["todos", "notes"], Config::in_memory()).unwrap();
    SyncTarget::new(db, &["todos", "notes"], Arc::new(MemoryLocalState::new())).unwrap()
}

fn fast() -> SyncConfig {
    SyncConfig::new().with_poll_interval(Duration::from_millis(20))
}

fn todos(target: &SyncTarget) -> offsync_core::Collection {
    offsync_core::Collection::new(target.db(), "todos").unwrap()
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..300 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn upload_then_download_between_devices() {
    init_tracing();
    let server = Arc::new(SyncServer::new(ServerConfig::default()));
    let net: Arc<dyn HttpClient> = network(&server);

    let laptop = device("laptop");
    todos(&laptop).save(json!({"id": "t1", "title": "milk"})).unwrap();
    todos(&laptop).save(json!({"id": "t2", "title": "eggs"})).unwrap();

    let report = UploadCoordinator::new(Arc::clone(&net), SyncConfig::default())
        .upload(&laptop, SERVER)
        .await
        .unwrap();
    assert_eq!(report.sent, 2);
    assert_eq!(report.acknowledged, 2);
    assert_eq!(report.watermark, Some(Watermark(2)));
    assert!(ChangeLog::pending(laptop.db()).unwrap().is_empty());
    assert_eq!(load_watermark(laptop.state()).unwrap(), Some(Watermark(2)));

    let phone = device("phone");
    let report = DownloadCoordinator::new(net, SyncConfig::default())
        .download(&phone, SERVER)
        .await
        .unwrap();
    assert_eq!(report.applied, 2);
    assert_eq!(
        todos(&phone).get_one(&RecordId::from("t2")).unwrap(),
        Some(json!({"id": "t2", "title": "eggs"}))
    );
    assert!(ChangeLog::pending(phone.db()).unwrap().is_empty());
}

#[tokio::test]
async fn download_resumes_from_upload_watermark() {
    init_tracing();
    let server = Arc::new(SyncServer::new(ServerConfig::default()));
    let net: Arc<dyn HttpClient> = network(&server);
    let upload = UploadCoordinator::new(Arc::clone(&net), SyncConfig::default());
    let download = DownloadCoordinator::new(net, SyncConfig::default());

    let laptop = device("laptop");
    let phone = device("phone");
    todos(&phone).save(json!({"id": "p1"})).unwrap();
    upload.upload(&phone, SERVER).await.unwrap();

    todos(&laptop).save(json!({"id": "l1"})).unwrap();
    upload.upload(&laptop, SERVER).await.unwrap();
    let report = download.download(&laptop, SERVER).await.unwrap();
    assert_eq!(report.applied, 0);
    assert!(todos(&laptop).get_one(&RecordId::from("p1")).unwrap().is_none());

    todos(&phone).save(json!({"id": "p2"})).unwrap();
    upload.upload(&phone, SERVER).await.unwrap();
    let report = download.download(&laptop, SERVER).await.unwrap();
    assert_eq!(report.applied, 1);
    assert!(todos(&laptop).get_one(&RecordId::from("p2")).unwrap().is_some());
}

#[tokio::test]
async fn polling_clients_converge() {
    init_tracing();
    let server = Arc::new(SyncServer::new(ServerConfig::default()));
    let laptop = device("laptop");
    let phone = device("phone");
    let laptop_client = SyncClient::over_http(laptop.clone(), network(&server), NetworkMonitor::new(true), fast());
    let phone_client = SyncClient::over_http(phone.clone(), network(&server), NetworkMonitor::new(true), fast());

    laptop_client.connect(POLL_URL).await.unwrap();
    phone_client.connect(POLL_URL).await.unwrap();
    wait_for(|| server.context().client_count() == 2).await;

    laptop_client
        .collection("todos")
        .unwrap()
        .save(json!({"id": "t1", "title": "milk"}))
        .unwrap();
    wait_for(|| todos(&phone).get_one(&RecordId::from("t1")).unwrap().is_some()).await;
    wait_for(|| ChangeLog::pending(laptop.db()).unwrap().is_empty()).await;

    phone_client.collection("todos").unwrap().remove(&RecordId::from("t1")).unwrap();
    wait_for(|| todos(&laptop).get_one(&RecordId::from("t1")).unwrap().is_none()).await;

    laptop_client.disconnect(POLL_URL).await;
    phone_client.disconnect(POLL_URL).await;
    assert_eq!(laptop_client.status(POLL_URL), Some(SyncStatus::Offline));
    assert!(phone_client.urls().is_empty());
}

#[tokio::test]
async fn unreachable_server_stops_the_loop() {
    init_tracing();
    let server = Arc::new(SyncServer::new(ServerConfig::default()));
    let net = network(&server);
    let laptop = device("laptop");
    let client = SyncClient::over_http(laptop.clone(), net.clone(), NetworkMonitor::new(true), fast());

    client.connect(POLL_URL).await.unwrap();
    wait_for(|| client.status(POLL_URL) == Some(SyncStatus::Online)).await;

    net.set_reachable(false);
    wait_for(|| client.status(POLL_URL) == Some(SyncStatus::Error)).await;
    assert!(client.urls().is_empty());

    let err = client.connect(POLL_URL).await.unwrap_err();
    assert!(matches!(err, SyncError::NotConnected(_)));

    todos(&laptop).save(json!({"id": "offline-edit"})).unwrap();
    net.set_reachable(true);
    client.connect(POLL_URL).await.unwrap();
    wait_for(|| server.store().len() == 1).await;
    wait_for(|| ChangeLog::pending(laptop.db()).unwrap().is_empty()).await;
    assert_eq!(server.context().client_count(), 1);
    client.disconnect(POLL_URL).await;
}

#[tokio::test]
async fn network_loss_suspends_polling() {
    init_tracing();
    let server = Arc::new(SyncServer::new(ServerConfig::default()));
    let laptop = device("laptop");
    let monitor = NetworkMonitor::new(true);
    let client = SyncClient::over_http(laptop.clone(), network(&server), monitor.clone(), fast());

    client.connect(POLL_URL).await.unwrap();
    wait_for(|| client.status(POLL_URL) == Some(SyncStatus::Online)).await;

    monitor.set_online(false);
    wait_for(|| client.status(POLL_URL) == Some(SyncStatus::Offline)).await;
    todos(&laptop).save(json!({"id": "t1"})).unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(server.store().is_empty());
    assert_eq!(client.urls(), [POLL_URL]);

    monitor.set_online(true);
    wait_for(|| server.store().len() == 1).await;
    client.disconnect(POLL_URL).await;
}

#[tokio::test]
async fn identity_and_revision_survive_restart() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let server = Arc::new(SyncServer::new(ServerConfig::default()));
    let reply = server.handle_post(
        "/api/v1/upload",
        br#"{"changes":[{"operation":"UPDATE","id":"s1","collectionName":"todos","changeSet":{"id":"s1"}}]}"#,
    );
    assert_eq!(reply.status, 200);

    let open = || {
        let db = Database::open("laptop", &["todos", "notes"], Config::at(dir.path())).unwrap();
        let state: Arc<dyn LocalState> = Arc::new(FileLocalState::open(dir.path().join("state.json")).unwrap());
        SyncTarget::new(db, &["todos", "notes"], state).unwrap()
    };

    {
        let laptop = open();
        let client = SyncClient::over_http(laptop.clone(), network(&server), NetworkMonitor::new(true), fast());
        client.connect(POLL_URL).await.unwrap();
        wait_for(|| todos(&laptop).get_one(&RecordId::from("s1")).unwrap().is_some()).await;
        client.disconnect(POLL_URL).await;
    }

    let laptop = open();
    assert!(todos(&laptop).get_one(&RecordId::from("s1")).unwrap().is_some());
    let client = SyncClient::over_http(laptop.clone(), network(&server), NetworkMonitor::new(true), fast());
    client.connect(POLL_URL).await.unwrap();
    todos(&laptop).save(json!({"id": "l1"})).unwrap();
    wait_for(|| server.store().len() == 2).await;
    client.disconnect(POLL_URL).await;

    assert_eq!(server.context().client_count(), 1);
}

#[tokio::test]
async fn remove_url_starts_over_with_a_new_identity() {
    init_tracing();
    let server = Arc::new(SyncServer::new(ServerConfig::default()));
    let laptop = device("laptop");
    let client = SyncClient::over_http(laptop, network(&server), NetworkMonitor::new(true), fast());

    client.connect(POLL_URL).await.unwrap();
    wait_for(|| client.status(POLL_URL) == Some(SyncStatus::Online)).await;
    client.remove_url(POLL_URL).await.unwrap();
    assert!(client.status(POLL_URL).is_none());

    client.connect(POLL_URL).await.unwrap();
    wait_for(|| server.context().client_count() == 2).await;
    client.disconnect(POLL_URL).await;
}
