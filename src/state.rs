use std::sync::Arc;

use crate::config::Config;
use crate::db::store::FileStore;
use crate::services::auth_service::AuthService;
use crate::ws::broadcast::Broadcaster;
use crate::ws::registry::ConnectionRegistry;

/// Shared handles passed to every route
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: FileStore,
    pub auth: Arc<AuthService>,
    pub broadcaster: Broadcaster,
}

impl AppState {
    pub fn new(config: Config, store: FileStore, auth: AuthService) -> Self {
        Self {
            config: Arc::new(config),
            store,
            auth: Arc::new(auth),
            broadcaster: Broadcaster::new(Arc::new(ConnectionRegistry::new())),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        self.broadcaster.registry()
    }
}
