//! HTTP transport.
//!
//! The engine talks to servers through the [`HttpClient`] trait.
//! [`ReqwestClient`] is the production implementation; [`LoopbackClient`]
//! routes requests to an in-process [`LoopbackServer`] for tests.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A response as seen by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// A network failure is reported as [`SyncError::Transport`]. Any answer
/// from the server, whatever its status, is a successful call.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a JSON POST request.
    async fn post(&self, url: &str, body: Vec<u8>) -> SyncResult<HttpResponse>;

    /// Sends a HEAD request and returns the status.
    async fn head(&self, url: &str) -> SyncResult<u16>;
}

/// Production HTTP client backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::transport(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wraps an existing `reqwest` client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn post(&self, url: &str, body: Vec<u8>) -> SyncResult<HttpResponse> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| SyncError::transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| SyncError::transport(e.to_string()))?;
        Ok(HttpResponse::new(status, body.to_vec()))
    }

    async fn head(&self, url: &str) -> SyncResult<u16> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| SyncError::transport(e.to_string()))?;
        Ok(response.status().as_u16())
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer: Send + Sync {
    /// Handles a POST request to `path`.
    fn handle_post(&self, path: &str, body: &[u8]) -> HttpResponse;

    /// Handles a HEAD request to `path`.
    fn handle_head(&self, _path: &str) -> u16 {
        200
    }
}

/// A loopback HTTP client that routes requests directly to a server.
///
/// Useful for testing without actual network overhead. The client can be
/// made unreachable to simulate network failures.
pub struct LoopbackClient<S> {
    server: S,
    reachable: AtomicBool,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self {
            server,
            reachable: AtomicBool::new(true),
        }
    }

    /// Returns the server.
    pub fn server(&self) -> &S {
        &self.server
    }

    /// Makes every request fail with a transport error while `false`.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    fn ensure_reachable(&self, url: &str) -> SyncResult<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::transport(format!("{url}: connection refused")))
        }
    }
}

#[async_trait]
impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    async fn post(&self, url: &str, body: Vec<u8>) -> SyncResult<HttpResponse> {
        self.ensure_reachable(url)?;
        Ok(self.server.handle_post(url_path(url), &body))
    }

    async fn head(&self, url: &str) -> SyncResult<u16> {
        self.ensure_reachable(url)?;
        Ok(self.server.handle_head(url_path(url)))
    }
}

/// Returns the path part of an absolute url, or the url itself.
fn url_path(url: &str) -> &str {
    match url.find("://") {
        Some(scheme_end) => {
            let rest = &url[scheme_end + 3..];
            rest.find('/').map_or("/", |i| &rest[i..])
        }
        None => url,
    }
}

/// Joins `path` onto `base` with exactly one slash between them.
#[must_use]
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// POSTs `request` as JSON and decodes a JSON response.
///
/// # Errors
///
/// Returns a transport error on network failure or a non-200 status, and a
/// protocol violation if the body is not the expected message.
pub async fn post_json<Req, Res>(client: &dyn HttpClient, url: &str, request: &Req) -> SyncResult<Res>
where
    Req: Serialize + Sync,
    Res: DeserializeOwned,
{
    let body = offsync_sync_protocol::encode(request)?;
    let response = client.post(url, body).await?;
    if response.status != 200 {
        return Err(SyncError::http_status(
            response.status,
            format!("{url} answered {}", status_text(response.status)),
        ));
    }
    Ok(offsync_sync_protocol::decode(&response.body)?)
}

fn status_text(status: u16) -> String {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason().map(|r| format!("{status} {r}")))
        .unwrap_or_else(|| status.to_string())
}
