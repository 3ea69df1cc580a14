use moka::future::Cache;
use std::time::Duration;
use tracing::{error, info};

use crate::db::{SheetStore, StoreError};

/// Display names by user id, refreshed from storage after five idle minutes.
#[derive(Clone)]
pub struct UserNameCache {
    cache: Cache<i64, String>,
}

impl UserNameCache {
    pub fn new() -> Self {
        let cache = Cache::builder()
            .max_capacity(100_000)
            .time_to_idle(Duration::from_secs(5 * 60))
            .build();
        info!("User name cache initialized");
        Self { cache }
    }

    /// Cached display name, falling back to storage on a miss. Unknown users are not cached.
    pub async fn get_or_fetch(&self, store: &dyn SheetStore, user_id: i64) -> Result<Option<String>, StoreError> {
        if let Some(name) = self.cache.get(&user_id).await {
            return Ok(Some(name));
        }

        info!("User name cache miss for user {}. Loading from storage.", user_id);
        let name = store.get_user_display_name(user_id).await.map_err(|e| {
            error!("Failed to load display name for user {}: {}", user_id, e);
            e
        })?;

        if let Some(name) = &name {
            self.cache.insert(user_id, name.clone()).await;
        }
        Ok(name)
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for UserNameCache {
    fn default() -> Self {
        Self::new()
    }
}
