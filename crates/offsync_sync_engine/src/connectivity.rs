//! Connectivity oracle.
//!
//! Decides whether a server is reachable. The platform's own notion of
//! network presence is fed in through a [`NetworkMonitor`]; a server is
//! online when the platform reports a network and a `HEAD <url>/check`
//! probe gets an answer.

use crate::http::{join_url, HttpClient};
use async_trait::async_trait;
use offsync_sync_protocol::CHECK_PATH;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Callback receiving connectivity transitions.
pub type ConnectivityListener = Box<dyn Fn(bool) + Send + Sync>;

/// Answers "is this server reachable" and reports transitions.
#[async_trait]
pub trait ConnectivityOracle: Send + Sync {
    /// Returns true if `url` is reachable. Without a url the answer is
    /// always false.
    async fn is_online(&self, url: Option<&str>) -> bool;

    /// Calls `listener` with the current status of `url`, then again on
    /// every platform network transition, until the subscription is
    /// dropped.
    fn on_status_change(&self, url: &str, listener: ConnectivityListener) -> StatusSubscription;
}

/// Keeps a status listener alive. Dropping it stops the notifications.
#[derive(Debug)]
pub struct StatusSubscription {
    task: JoinHandle<()>,
}

impl StatusSubscription {
    /// Stops the notifications.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for StatusSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// The platform's network presence flag.
///
/// Clones share the same flag. The host calls [`NetworkMonitor::set_online`]
/// whenever the platform gains or loses its network.
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    sender: Arc<watch::Sender<bool>>,
}

impl NetworkMonitor {
    /// Creates a monitor with an initial presence.
    #[must_use]
    pub fn new(online: bool) -> Self {
        let (sender, _) = watch::channel(online);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Records a change of network presence.
    pub fn set_online(&self, online: bool) {
        let previous = self.sender.send_replace(online);
        if previous != online {
            tracing::debug!(online, "network presence changed");
        }
    }

    /// Returns the current network presence.
    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    /// Subscribes to presence changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Oracle that probes servers over HTTP.
#[derive(Clone)]
pub struct HttpConnectivityOracle {
    client: Arc<dyn HttpClient>,
    monitor: NetworkMonitor,
    check_path: String,
}

impl HttpConnectivityOracle {
    /// Creates an oracle probing through `client`.
    pub fn new(client: Arc<dyn HttpClient>, monitor: NetworkMonitor) -> Self {
        Self {
            client,
            monitor,
            check_path: CHECK_PATH.to_string(),
        }
    }

    /// Sets the path appended to urls for probes.
    #[must_use]
    pub fn with_check_path(mut self, path: impl Into<String>) -> Self {
        self.check_path = path.into();
        self
    }

    /// Returns the monitor.
    #[must_use]
    pub fn monitor(&self) -> &NetworkMonitor {
        &self.monitor
    }

    async fn probe(&self, url: &str) -> bool {
        let check = join_url(url, &self.check_path);
        match self.client.head(&check).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(url = %check, error = %e, "connectivity probe failed");
                false
            }
        }
    }
}

#[async_trait]
impl ConnectivityOracle for HttpConnectivityOracle {
    async fn is_online(&self, url: Option<&str>) -> bool {
        match url {
            Some(url) if !url.is_empty() && self.monitor.is_online() => self.probe(url).await,
            _ => false,
        }
    }

    fn on_status_change(&self, url: &str, listener: ConnectivityListener) -> StatusSubscription {
        let oracle = self.clone();
        let url = url.to_string();
        let mut presence = self.monitor.subscribe();
        let task = tokio::spawn(async move {
            listener(oracle.is_online(Some(&url)).await);
            while presence.changed().await.is_ok() {
                let present = *presence.borrow_and_update();
                if present {
                    listener(oracle.probe(&url).await);
                } else {
                    listener(false);
                }
            }
        });
        StatusSubscription { task }
    }
}

/// Oracle that trusts the platform presence flag without probing.
///
/// Useful for tests and for hosts that know reachability by other means.
#[derive(Debug, Clone, Default)]
pub struct StaticConnectivity {
    monitor: NetworkMonitor,
}

impl StaticConnectivity {
    /// Creates an oracle reporting `online`.
    #[must_use]
    pub fn new(online: bool) -> Self {
        Self {
            monitor: NetworkMonitor::new(online),
        }
    }

    /// Changes the reported status.
    pub fn set_online(&self, online: bool) {
        self.monitor.set_online(online);
    }
}

#[async_trait]
impl ConnectivityOracle for StaticConnectivity {
    async fn is_online(&self, url: Option<&str>) -> bool {
        url.is_some_and(|u| !u.is_empty()) && self.monitor.is_online()
    }

    fn on_status_change(&self, _url: &str, listener: ConnectivityListener) -> StatusSubscription {
        let mut presence = self.monitor.subscribe();
        let task = tokio::spawn(async move {
            listener(*presence.borrow_and_update());
            while presence.changed().await.is_ok() {
                listener(*presence.borrow_and_update());
            }
        });
        StatusSubscription { task }
    }
}
