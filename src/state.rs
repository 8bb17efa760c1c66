use std::sync::Arc;

use crate::config::Config;
use crate::db::{DocumentStore, UserDirectory};
use crate::services::{IdentityProvider, JwtVerifier, SyncCoordinator};
use crate::ws::{RoomRegistry, UserCtxCache};

/// Everything a connection task shares with the others
pub struct AppState {
    pub config: Config,
    pub registry: Arc<RoomRegistry>,
    pub verifier: Arc<dyn IdentityProvider>,
    pub coordinator: SyncCoordinator,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn DocumentStore>, verifier: Arc<dyn IdentityProvider>) -> Self {
        let registry = Arc::new(RoomRegistry::new(config.outbound_queue_capacity));
        Self {
            config,
            registry,
            verifier,
            coordinator: SyncCoordinator::new(store),
        }
    }

    /// Wire a store that also serves as the user directory behind a JWT verifier
    pub fn with_store<S>(config: Config, store: Arc<S>) -> Self
    where
        S: DocumentStore + UserDirectory + 'static,
    {
        let verifier = JwtVerifier::new(
            config.jwt_secret.clone(),
            store.clone(),
            UserCtxCache::new(config.user_cache_ttl()),
        );
        Self::new(config, store, Arc::new(verifier))
    }
}
