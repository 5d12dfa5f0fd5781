//! Server configuration.

use offsync_sync_protocol::{CHECK_PATH, DOWNLOAD_PATH, UPLOAD_PATH};

/// Path of the poll endpoint.
pub const POLL_PATH: &str = "/api/v1/poll";

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path of the upload endpoint.
    pub upload_path: String,
    /// Path of the download endpoint.
    pub download_path: String,
    /// Path of the poll endpoint.
    pub poll_path: String,
    /// Last path segment answered by connectivity probes.
    pub check_path: String,
    /// Maximum number of changes returned by one poll round.
    pub max_poll_batch: usize,
    /// Collections the server accepts; `None` accepts any.
    pub collections: Option<Vec<String>>,
}

impl ServerConfig {
    /// Creates a configuration with the default endpoints.
    pub fn new() -> Self {
        Self {
            upload_path: UPLOAD_PATH.to_string(),
            download_path: DOWNLOAD_PATH.to_string(),
            poll_path: POLL_PATH.to_string(),
            check_path: CHECK_PATH.to_string(),
            max_poll_batch: 1000,
            collections: None,
        }
    }

    /// Sets the maximum poll batch size, at least one.
    #[must_use]
    pub fn with_max_poll_batch(mut self, size: usize) -> Self {
        self.max_poll_batch = size.max(1);
        self
    }

    /// Restricts the accepted collections.
    #[must_use]
    pub fn with_collections(mut self, names: &[&str]) -> Self {
        self.collections = Some(names.iter().map(|n| (*n).to_string()).collect());
        self
    }

    /// Sets the poll endpoint path.
    #[must_use]
    pub fn with_poll_path(mut self, path: impl Into<String>) -> Self {
        self.poll_path = path.into();
        self
    }

    /// Returns true if changes to `collection` are accepted.
    pub fn accepts(&self, collection: &str) -> bool {
        self.collections
            .as_ref()
            .map_or(true, |names| names.iter().any(|n| n == collection))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.upload_path, "/api/v1/upload");
        assert_eq!(config.poll_path, POLL_PATH);
        assert_eq!(config.max_poll_batch, 1000);
        assert!(config.accepts("anything"));
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new()
            .with_max_poll_batch(0)
            .with_collections(&["todos"])
            .with_poll_path("/sync");

        assert_eq!(config.max_poll_batch, 1);
        assert_eq!(config.poll_path, "/sync");
        assert!(config.accepts("todos"));
        assert!(!config.accepts("notes"));
    }
}
