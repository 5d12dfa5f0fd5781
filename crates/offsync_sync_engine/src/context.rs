//! Per-url sync context.

use crate::error::SyncResult;
use offsync_core::LocalState;
use offsync_sync_protocol::ClientIdentity;
use std::sync::Arc;

/// Durable storage for sync contexts.
pub trait ContextPersistence: Send + Sync {
    /// Loads the client identity stored for `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity cannot be read.
    fn load(&self, url: &str) -> SyncResult<Option<ClientIdentity>>;

    /// Stores the client identity for `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity cannot be written.
    fn save(&self, url: &str, identity: &ClientIdentity) -> SyncResult<()>;

    /// Forgets everything stored for `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be written.
    fn remove(&self, url: &str) -> SyncResult<()>;
}

/// Context persistence on top of [`LocalState`].
#[derive(Clone)]
pub struct LocalStatePersistence {
    state: Arc<dyn LocalState>,
}

impl LocalStatePersistence {
    /// Creates a persistence layer over `state`.
    pub fn new(state: Arc<dyn LocalState>) -> Self {
        Self { state }
    }

    fn key(url: &str) -> String {
        format!("clientIdentity:{url}")
    }
}

impl ContextPersistence for LocalStatePersistence {
    fn load(&self, url: &str) -> SyncResult<Option<ClientIdentity>> {
        Ok(self.state.get(&Self::key(url))?.map(ClientIdentity::new))
    }

    fn save(&self, url: &str, identity: &ClientIdentity) -> SyncResult<()> {
        Ok(self.state.set(&Self::key(url), identity.as_str())?)
    }

    fn remove(&self, url: &str) -> SyncResult<()> {
        Ok(self.state.remove(&Self::key(url))?)
    }
}

/// The client identity of one server url, plus the means to persist it.
///
/// An identity that fails to persist is dropped, so a round is never sent
/// with an identity that would be lost on restart.
pub struct SyncContext {
    url: String,
    client_identity: Option<ClientIdentity>,
    persistence: Arc<dyn ContextPersistence>,
}

impl SyncContext {
    /// Loads the context of `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored identity cannot be read.
    pub fn load(url: &str, persistence: Arc<dyn ContextPersistence>) -> SyncResult<Self> {
        let client_identity = persistence.load(url)?;
        Ok(Self {
            url: url.to_string(),
            client_identity,
            persistence,
        })
    }

    /// Returns the server url.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the client identity, if one was issued.
    #[must_use]
    pub fn client_identity(&self) -> Option<&ClientIdentity> {
        self.client_identity.as_ref()
    }

    /// Adopts a newly issued identity and saves the context.
    ///
    /// # Errors
    ///
    /// Returns an error if the context cannot be saved. The identity is
    /// dropped again in that case.
    pub fn establish(&mut self, identity: ClientIdentity) -> SyncResult<()> {
        self.client_identity = Some(identity);
        if let Err(e) = self.save() {
            self.client_identity = None;
            return Err(e);
        }
        tracing::info!(url = %self.url, identity = ?self.client_identity, "client identity established");
        Ok(())
    }

    /// Persists the context.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity cannot be written.
    pub fn save(&self) -> SyncResult<()> {
        match &self.client_identity {
            Some(identity) => self.persistence.save(&self.url, identity),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("url", &self.url)
            .field("client_identity", &self.client_identity)
            .finish_non_exhaustive()
    }
}
