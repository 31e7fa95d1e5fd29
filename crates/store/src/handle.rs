use std::sync::Arc;

use tracing::{debug, error, info};

use crate::{
    Result, SqliteStore, Store,
    types::{ForcedChannel, NewForcedChannel, Statistics, UserProfile},
};

/// Store capability resolved once at startup.
///
/// Every method is infallible: when the database is absent or a query fails
/// the error is logged and the empty / no-op result is returned, so callers
/// never branch on database health.
#[derive(Clone)]
pub enum StoreHandle {
    Available(Arc<dyn Store>),
    Unavailable,
}

impl StoreHandle {
    /// Connect to SQLite, falling back to [`StoreHandle::Unavailable`].
    pub async fn connect(database_url: &str) -> Self {
        match SqliteStore::connect(database_url).await {
            Ok(store) => Self::Available(Arc::new(store)),
            Err(e) => {
                error!(error = %e, "database connection failed, running without a store");
                Self::Unavailable
            },
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    fn store(&self, operation: &'static str) -> Option<&Arc<dyn Store>> {
        match self {
            Self::Available(store) => Some(store),
            Self::Unavailable => {
                debug!(operation, "store unavailable, skipping");
                None
            },
        }
    }

    pub async fn upsert_user(&self, user: &UserProfile) -> bool {
        let Some(store) = self.store("upsert_user") else {
            return false;
        };
        absorb("upsert_user", store.upsert_user(user).await.map(|()| true))
    }

    pub async fn increment_download_count(&self, user_id: i64) -> bool {
        let Some(store) = self.store("increment_download_count") else {
            return false;
        };
        let updated = absorb(
            "increment_download_count",
            store.increment_download_count(user_id).await,
        );
        if !updated {
            info!(user_id, "download counter not incremented");
        }
        updated
    }

    pub async fn upsert_forced_channel(&self, channel: &NewForcedChannel) -> bool {
        let Some(store) = self.store("upsert_forced_channel") else {
            return false;
        };
        absorb(
            "upsert_forced_channel",
            store.upsert_forced_channel(channel).await.map(|()| true),
        )
    }

    pub async fn list_forced_channels(&self) -> Vec<ForcedChannel> {
        let Some(store) = self.store("list_forced_channels") else {
            return Vec::new();
        };
        absorb("list_forced_channels", store.list_forced_channels().await)
    }

    pub async fn list_user_ids(&self) -> Vec<i64> {
        let Some(store) = self.store("list_user_ids") else {
            return Vec::new();
        };
        absorb("list_user_ids", store.list_user_ids().await)
    }

    pub async fn statistics(&self) -> Statistics {
        let Some(store) = self.store("statistics") else {
            return Statistics::default();
        };
        absorb("statistics", store.statistics().await)
    }

    pub async fn record_broadcast(&self, at: i64) -> bool {
        let Some(store) = self.store("record_broadcast") else {
            return false;
        };
        absorb(
            "record_broadcast",
            store.record_broadcast(at).await.map(|()| true),
        )
    }
}

fn absorb<T: Default>(operation: &'static str, result: Result<T>) -> T {
    result.unwrap_or_else(|e| {
        error!(operation, error = %e, "store query failed");
        T::default()
    })
}
