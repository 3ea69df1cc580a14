use std::sync::Arc;

use crate::config::{Config, SyncSettings};
use crate::db::SheetStore;
use crate::services::CellSynchronizer;
use crate::ws::{SyncHub, UserNameCache};

/// Shared state handed to every HTTP and WebSocket handler
pub struct AppState {
    pub config: Arc<Config>,
    pub settings: SyncSettings,
    pub hub: Arc<SyncHub>,
    pub store: Arc<dyn SheetStore>,
    pub cells: CellSynchronizer,
    pub user_names: UserNameCache,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn SheetStore>) -> Self {
        let settings = config.sync_settings();
        Self::with_settings(config, settings, store)
    }

    /// Like `new`, with timings that do not come from the configuration.
    pub fn with_settings(config: Config, settings: SyncSettings, store: Arc<dyn SheetStore>) -> Self {
        let hub = Arc::new(SyncHub::new(settings.lock_ttl));
        let cells = CellSynchronizer::new(store.clone(), hub.locks.clone());
        Self {
            config: Arc::new(config),
            settings,
            hub,
            store,
            cells,
            user_names: UserNameCache::new(),
        }
    }
}
