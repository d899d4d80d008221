use moka::future::Cache;
use std::time::Duration;

use crate::models::UserRecord;

/// Short-lived cache of user records resolved from access tokens
#[derive(Clone)]
pub struct UserCtxCache {
    cache: Cache<i64, UserRecord>,
}

impl UserCtxCache {
    pub fn new() -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(Duration::from_secs(60))
                .build(),
        }
    }

    pub async fn get(&self, user_id: i64) -> Option<UserRecord> {
        self.cache.get(&user_id).await
    }

    pub async fn insert(&self, user: UserRecord) {
        self.cache.insert(user.id, user).await;
    }
}
