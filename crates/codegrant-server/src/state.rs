//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::store::{AuthorizationStore, SharedStore};

/// Application state shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,

    /// Registered clients, outstanding codes and issued tokens.
    pub store: SharedStore,
}

impl AppState {
    /// Create the state and register the configured clients.
    pub fn new(config: ServerConfig) -> Self {
        let store = AuthorizationStore::new(config.code_ttl, config.token_ttl);
        for client in &config.clients {
            store.register_client(client.clone());
        }
        tracing::debug!(clients = config.clients.len(), "Authorization store initialized");

        Self {
            config: Arc::new(config),
            store: Arc::new(store),
        }
    }
}
