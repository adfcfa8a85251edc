//! Client state shared by every operation.
//!
//! A [`ChatClient`] bundles the auth provider, the document store and the
//! local session cache.  It is cheap to clone and is passed to the identity,
//! thread, realtime and session functions instead of living in a global.

use std::sync::Arc;

use tracing::info;

use obrolan_store::{default_data_dir, Database, KeyValueStore, MemoryKv, SessionCache};

use crate::backend::firebase::{FirebaseAuth, FirestoreRest};
use crate::backend::{AuthProvider, DocumentStore, MemoryBackend};
use crate::config::ClientConfig;
use crate::error::ChatError;

/// Handle to the backends and the local cache.
#[derive(Clone)]
pub struct ChatClient {
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn DocumentStore>,
    session: SessionCache,
}

impl ChatClient {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn DocumentStore>,
        session: SessionCache,
    ) -> Self {
        Self {
            auth,
            store,
            session,
        }
    }

    /// A client over one [`MemoryBackend`] serving as both auth provider and
    /// document store, with an in-memory cache.
    pub fn in_memory(backend: MemoryBackend) -> Self {
        Self::with_cache(backend, Arc::new(MemoryKv::default()))
    }

    /// Like [`ChatClient::in_memory`] but over the given cache, so a
    /// "relaunch" can be simulated by building a second client on it.
    pub fn with_cache(backend: MemoryBackend, kv: Arc<dyn KeyValueStore>) -> Self {
        let backend = Arc::new(backend);
        Self::new(backend.clone(), backend, SessionCache::new(kv))
    }

    /// Open the on-disk cache and connect the configured backend.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ChatError> {
        let data_dir = match &config.data_dir {
            Some(dir) => dir.clone(),
            None => default_data_dir()?,
        };
        let key = config.cache_key_for(&data_dir);
        let database = Database::open_in_dir(&data_dir, &key)?;
        let session = SessionCache::new(Arc::new(database));

        match &config.firebase {
            Some(firebase) => {
                let http = reqwest::Client::builder()
                    .timeout(config.http_timeout)
                    .build()
                    .map_err(crate::error::BackendError::from)?;
                let auth = Arc::new(FirebaseAuth::new(http.clone(), firebase.api_key.clone()));
                let store = FirestoreRest::new(
                    http,
                    auth.clone(),
                    &firebase.project_id,
                    config.poll_interval,
                );
                info!(project = %firebase.project_id, data_dir = %data_dir.display(), "using Firebase backend");
                Ok(Self::new(auth, Arc::new(store), session))
            }
            None => {
                info!(data_dir = %data_dir.display(), "using in-memory backend");
                let backend = Arc::new(MemoryBackend::new());
                Ok(Self::new(backend.clone(), backend, session))
            }
        }
    }

    pub fn auth(&self) -> &dyn AuthProvider {
        self.auth.as_ref()
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub(crate) fn store_handle(&self) -> Arc<dyn DocumentStore> {
        self.store.clone()
    }

    pub fn session(&self) -> &SessionCache {
        &self.session
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient").finish_non_exhaustive()
    }
}
