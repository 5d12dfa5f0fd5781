//! Configuration for the sync engine.

use offsync_sync_protocol::{CHECK_PATH, DOWNLOAD_PATH, UPLOAD_PATH};
use std::time::Duration;

/// Default time between poll rounds.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Path of the upload endpoint.
    pub upload_path: String,
    /// Path of the download endpoint.
    pub download_path: String,
    /// Path appended to a url for connectivity probes.
    pub check_path: String,
    /// Time between successful poll rounds, and before retrying a
    /// transient failure.
    pub poll_interval: Duration,
    /// Request timeout for the production HTTP client.
    pub request_timeout: Duration,
    /// Maximum number of local changes sent in one poll round.
    pub partials_threshold: usize,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            upload_path: UPLOAD_PATH.to_string(),
            download_path: DOWNLOAD_PATH.to_string(),
            check_path: CHECK_PATH.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: Duration::from_secs(30),
            partials_threshold: 1000,
        }
    }

    /// Sets the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the partials threshold. Zero is treated as one.
    #[must_use]
    pub fn with_partials_threshold(mut self, threshold: usize) -> Self {
        self.partials_threshold = threshold.max(1);
        self
    }

    /// Sets the upload and download endpoint paths.
    #[must_use]
    pub fn with_endpoints(mut self, upload: impl Into<String>, download: impl Into<String>) -> Self {
        self.upload_path = upload.into();
        self.download_path = download.into();
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.upload_path, "/api/v1/upload");
        assert_eq!(config.download_path, "/api/v1/download");
        assert_eq!(config.check_path, "check");
    }

    #[test]
    fn builder() {
        let config = SyncConfig::new()
            .with_poll_interval(Duration::from_millis(50))
            .with_partials_threshold(0)
            .with_endpoints("/up", "/down");
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.partials_threshold, 1);
        assert_eq!(config.download_path, "/down");
    }
}
