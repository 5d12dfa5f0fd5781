//! Connection manager running one poll loop per server url.

use crate::config::SyncConfig;
use crate::connectivity::{ConnectivityOracle, HttpConnectivityOracle, NetworkMonitor, StatusSubscription};
use crate::context::{ContextPersistence, LocalStatePersistence, SyncContext};
use crate::error::{SyncError, SyncResult};
use crate::http::HttpClient;
use crate::protocol::{Communicator, HttpCommunicator, PollSyncProtocol, RetryAfter, RoundOutcome};
use crate::replica::ChangeLogReplica;
use crate::target::SyncTarget;
use offsync_core::{generate_id, Collection, RecordId};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Connection status of one server url.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncStatus {
    /// The loop stopped on a fatal error; an explicit reconnect is needed.
    Error,
    /// Not connected.
    Offline,
    /// Starting the loop.
    Connecting,
    /// The last round completed.
    Online,
    /// A round is in progress.
    Syncing,
    /// The last round failed and will be retried.
    ErrorWillRetry,
}

impl SyncStatus {
    /// Returns the status name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Error => "ERROR",
            SyncStatus::Offline => "OFFLINE",
            SyncStatus::Connecting => "CONNECTING",
            SyncStatus::Online => "ONLINE",
            SyncStatus::Syncing => "SYNCING",
            SyncStatus::ErrorWillRetry => "ERROR_WILL_RETRY",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback receiving status transitions of one url.
pub type StatusListener = Arc<dyn Fn(SyncStatus) + Send + Sync>;

/// Keeps a database in sync with any number of servers.
///
/// Each connected url gets its own poll loop. The loop stops scheduling
/// rounds when the url is disconnected, when the platform loses its network
/// (it resumes when the network returns), or on a fatal error, after which
/// the url must be connected again explicitly.
///
/// Must be used from within a tokio runtime.
#[derive(Clone)]
pub struct SyncClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    target: SyncTarget,
    communicator: Arc<dyn Communicator>,
    oracle: Arc<dyn ConnectivityOracle>,
    persistence: Arc<dyn ContextPersistence>,
    config: SyncConfig,
    connections: Mutex<HashMap<String, Connection>>,
    statuses: Mutex<BTreeMap<String, SyncStatus>>,
    listeners: Mutex<HashMap<String, StatusListener>>,
    next_generation: AtomicU64,
}

struct Connection {
    config: SyncConfig,
    worker: Option<Worker>,
    /// A suspended loop that may still be finishing its round.
    stopping: Option<JoinHandle<()>>,
    subscription: Option<StatusSubscription>,
}

/// A running poll loop.
struct Worker {
    generation: u64,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Worker {
    fn stop(self) -> JoinHandle<()> {
        self.shutdown.send_replace(true);
        self.task
    }
}

impl SyncClient {
    /// Creates a client from its collaborators.
    pub fn new(
        target: SyncTarget,
        communicator: Arc<dyn Communicator>,
        oracle: Arc<dyn ConnectivityOracle>,
        persistence: Arc<dyn ContextPersistence>,
        config: SyncConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                target,
                communicator,
                oracle,
                persistence,
                config,
                connections: Mutex::new(HashMap::new()),
                statuses: Mutex::new(BTreeMap::new()),
                listeners: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Creates a client that talks HTTP through `client`.
    ///
    /// Contexts are persisted in the target's local state and connectivity
    /// is probed over HTTP, gated by `monitor`.
    pub fn over_http(
        target: SyncTarget,
        client: Arc<dyn HttpClient>,
        monitor: NetworkMonitor,
        config: SyncConfig,
    ) -> Self {
        let communicator = Arc::new(HttpCommunicator::new(Arc::clone(&client)));
        let oracle = Arc::new(
            HttpConnectivityOracle::new(client, monitor).with_check_path(config.check_path.clone()),
        );
        let persistence = Arc::new(LocalStatePersistence::new(target.state_handle()));
        Self::new(target, communicator, oracle, persistence, config)
    }

    /// Generates a new unique record id.
    #[must_use]
    pub fn generate_id() -> RecordId {
        generate_id()
    }

    /// Returns a handle on one of the synced collections.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidArgument`] if `name` is not synced.
    pub fn collection(&self, name: &str) -> SyncResult<Collection> {
        if !self.inner.target.syncs(name) {
            return Err(SyncError::InvalidArgument(format!("{name} is not synced")));
        }
        Ok(Collection::new(self.inner.target.db(), name)?)
    }

    /// Connects to `url` with the client's default configuration.
    ///
    /// # Errors
    ///
    /// See [`SyncClient::connect_with`].
    pub async fn connect(&self, url: &str) -> SyncResult<()> {
        self.connect_with(url, self.inner.config.clone()).await
    }

    /// Connects to `url` and starts its poll loop.
    ///
    /// Connecting an already connected url does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotConnected`] if the server is not reachable.
    pub async fn connect_with(&self, url: &str, config: SyncConfig) -> SyncResult<()> {
        if self.inner.connections.lock().contains_key(url) {
            return Ok(());
        }
        if !self.inner.oracle.is_online(Some(url)).await {
            self.inner.set_status(url, SyncStatus::Offline);
            return Err(SyncError::NotConnected("Is not online".into()));
        }

        {
            let mut connections = self.inner.connections.lock();
            if connections.contains_key(url) {
                return Ok(());
            }
            let worker = self.inner.spawn_worker(url, &config, None);
            connections.insert(
                url.to_string(),
                Connection {
                    config,
                    worker: Some(worker),
                    stopping: None,
                    subscription: None,
                },
            );
        }

        let weak = Arc::downgrade(&self.inner);
        let watched = url.to_string();
        let subscription = self.inner.oracle.on_status_change(
            url,
            Box::new(move |online| {
                if let Some(inner) = weak.upgrade() {
                    if online {
                        inner.resume(&watched);
                    } else {
                        inner.suspend(&watched);
                    }
                }
            }),
        );
        if let Some(connection) = self.inner.connections.lock().get_mut(url) {
            connection.subscription = Some(subscription);
        }

        tracing::info!(url, "connected");
        Ok(())
    }

    /// Stops the poll loop of `url` and forgets the url.
    ///
    /// Waits for a round in progress to finish.
    pub async fn disconnect(&self, url: &str) {
        let connection = self.inner.connections.lock().remove(url);
        let Some(connection) = connection else {
            return;
        };
        drop(connection.subscription);
        // A running loop first waits for any suspended one
        let task = match connection.worker {
            Some(worker) => Some(worker.stop()),
            None => connection.stopping,
        };
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(url, error = %e, "poll loop ended abnormally");
            }
        }
        self.inner.set_status(url, SyncStatus::Offline);
        tracing::info!(url, "disconnected");
    }

    /// Disconnects `url` and deletes everything stored for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored context or revision cannot be removed.
    pub async fn remove_url(&self, url: &str) -> SyncResult<()> {
        self.disconnect(url).await;
        self.inner.listeners.lock().remove(url);
        self.inner.statuses.lock().remove(url);
        self.inner.persistence.remove(url)?;
        ChangeLogReplica::new(self.inner.target.clone(), url, 1).forget()?;
        tracing::info!(url, "removed");
        Ok(())
    }

    /// Registers the status listener of `url`, replacing any previous one.
    pub fn status_change<F>(&self, url: &str, listener: F)
    where
        F: Fn(SyncStatus) + Send + Sync + 'static,
    {
        self.inner
            .listeners
            .lock()
            .insert(url.to_string(), Arc::new(listener));
    }

    /// Returns the status of every known url, sorted by url.
    #[must_use]
    pub fn statuses(&self) -> Vec<(String, SyncStatus)> {
        self.inner
            .statuses
            .lock()
            .iter()
            .map(|(url, status)| (url.clone(), *status))
            .collect()
    }

    /// Returns the status of `url`.
    #[must_use]
    pub fn status(&self, url: &str) -> Option<SyncStatus> {
        self.inner.statuses.lock().get(url).copied()
    }

    /// Returns the connected urls, sorted.
    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.inner.connections.lock().keys().cloned().collect();
        urls.sort();
        urls
    }
}

impl ClientInner {
    fn spawn_worker(
        self: &Arc<Self>,
        url: &str,
        config: &SyncConfig,
        previous: Option<JoinHandle<()>>,
    ) -> Worker {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let (shutdown, stopped) = watch::channel(false);
        let task = tokio::spawn(run_loop(
            Arc::downgrade(self),
            url.to_string(),
            config.clone(),
            generation,
            previous,
            stopped,
        ));
        Worker {
            generation,
            shutdown,
            task,
        }
    }

    /// Restarts the loop of a connected url after the network returned.
    fn resume(self: &Arc<Self>, url: &str) {
        let mut connections = self.connections.lock();
        let Some(connection) = connections.get_mut(url) else {
            return;
        };
        if connection.worker.as_ref().is_some_and(|w| !w.task.is_finished()) {
            return;
        }
        tracing::info!(url, "network returned, resuming");
        let previous = connection.stopping.take();
        connection.worker = Some(self.spawn_worker(url, &connection.config, previous));
    }

    /// Stops the loop of a connected url while the network is gone.
    ///
    /// A round in flight is not cancelled. Its task is kept so that the
    /// next loop for `url` starts only after it ends.
    fn suspend(&self, url: &str) {
        {
            let mut connections = self.connections.lock();
            let Some(connection) = connections.get_mut(url) else {
                return;
            };
            if let Some(worker) = connection.worker.take() {
                tracing::info!(url, "network lost, suspending");
                connection.stopping = Some(worker.stop());
            }
        }
        self.set_status(url, SyncStatus::Offline);
    }

    /// Ends the connection after a fatal error in loop `generation`.
    fn fail(&self, url: &str, generation: u64, error: &SyncError) {
        tracing::error!(url, error = %error, "sync stopped");
        let removed = {
            let mut connections = self.connections.lock();
            let current = connections
                .get(url)
                .and_then(|c| c.worker.as_ref())
                .is_some_and(|w| w.generation == generation);
            if current {
                connections.remove(url)
            } else {
                None
            }
        };
        drop(removed);
        self.set_status(url, SyncStatus::Error);
    }

    fn set_status(&self, url: &str, status: SyncStatus) {
        let previous = self.statuses.lock().insert(url.to_string(), status);
        if previous == Some(status) {
            return;
        }
        tracing::debug!(url, %status, "status changed");
        let listener = self.listeners.lock().get(url).cloned();
        if let Some(listener) = listener {
            listener(status);
        }
    }
}

async fn run_loop(
    client: Weak<ClientInner>,
    url: String,
    config: SyncConfig,
    generation: u64,
    previous: Option<JoinHandle<()>>,
    mut stopped: watch::Receiver<bool>,
) {
    if let Some(previous) = previous {
        if let Err(e) = previous.await {
            tracing::warn!(url = %url, error = %e, "suspended poll loop ended abnormally");
        }
    }
    if *stopped.borrow() {
        return;
    }

    let (protocol, replica, mut context) = {
        let Some(inner) = client.upgrade() else {
            return;
        };
        inner.set_status(&url, SyncStatus::Connecting);
        let context = match SyncContext::load(&url, Arc::clone(&inner.persistence)) {
            Ok(context) => context,
            Err(e) => return inner.fail(&url, generation, &e),
        };
        let protocol = PollSyncProtocol::new(
            Arc::clone(&inner.communicator),
            Arc::clone(&inner.oracle),
            config.poll_interval,
        );
        let replica = ChangeLogReplica::new(inner.target.clone(), url.clone(), config.partials_threshold);
        (protocol, replica, context)
    };

    loop {
        if *stopped.borrow() {
            return;
        }
        let Some(inner) = client.upgrade() else {
            return;
        };
        let input = match replica.next_round() {
            Ok(input) => input,
            Err(e) => return inner.fail(&url, generation, &e),
        };
        inner.set_status(&url, SyncStatus::Syncing);

        let outcome = protocol.round(&mut context, input, &replica).await;
        if *stopped.borrow() {
            return;
        }
        let wait = match outcome {
            RoundOutcome::Success { again } => {
                inner.set_status(&url, SyncStatus::Online);
                if replica.has_more() {
                    Duration::ZERO
                } else {
                    again
                }
            }
            RoundOutcome::Failed {
                error,
                retry_after: RetryAfter::After(delay),
            } => {
                tracing::debug!(url = %url, error = %error, ?delay, "retry scheduled");
                inner.set_status(&url, SyncStatus::ErrorWillRetry);
                delay
            }
            RoundOutcome::Failed {
                error,
                retry_after: RetryAfter::Never,
            } => return inner.fail(&url, generation, &error),
        };
        drop(inner);

        tokio::select! {
            () = tokio::time::sleep(wait) => {}
            _ = stopped.changed() => return,
        }
    }
}

impl fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncClient")
            .field("target", &self.inner.target)
            .field("urls", &self.urls())
            .finish_non_exhaustive()
    }
}
