//! Persistence for bot users, forced channels and download statistics.
//!
//! [`Store`] is the typed adapter over the database. The rest of the bot goes
//! through [`StoreHandle`], which is resolved once at startup and degrades to
//! empty results when the database is missing or a query fails.

pub mod error;
pub mod handle;
pub mod sqlite;
pub mod types;

pub use {
    error::{Error, Result},
    handle::StoreHandle,
    sqlite::SqliteStore,
    types::{ForcedChannel, NewForcedChannel, Statistics, StoredUser, UserProfile},
};

use async_trait::async_trait;

/// Row-level persistence operations. Every write is an idempotent upsert keyed
/// by the platform id.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert the user or refresh their display names. `join_date` and the
    /// download counter are left untouched on conflict.
    async fn upsert_user(&self, user: &UserProfile) -> Result<()>;

    /// Bump the download counter. Returns `false` when the user is unknown, in
    /// which case no row is created.
    async fn increment_download_count(&self, user_id: i64) -> Result<bool>;

    async fn upsert_forced_channel(&self, channel: &NewForcedChannel) -> Result<()>;

    async fn list_forced_channels(&self) -> Result<Vec<ForcedChannel>>;

    async fn list_user_ids(&self) -> Result<Vec<i64>>;

    async fn statistics(&self) -> Result<Statistics>;

    /// Remember when the last broadcast finished (unix seconds).
    async fn record_broadcast(&self, at: i64) -> Result<()>;
}

/// Current time in unix seconds, the unit of every stored timestamp.
pub fn now_secs() -> i64 {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    i64::try_from(secs).unwrap_or(i64::MAX)
}
