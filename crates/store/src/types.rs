/// Identity fields refreshed on every inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
}

/// A persisted user row.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StoredUser {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub join_date: i64,
    pub download_count: i64,
}

/// A channel users must join before downloading.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ForcedChannel {
    pub channel_id: i64,
    /// `@handle`, when the channel is public.
    pub channel_username: Option<String>,
    pub channel_title: String,
    pub added_date: i64,
}

impl ForcedChannel {
    /// Public invite link, if the channel has a handle.
    pub fn link(&self) -> Option<String> {
        self.channel_username
            .as_deref()
            .map(|handle| format!("https://t.me/{}", handle.trim_start_matches('@')))
    }
}

/// A resolved channel ready to be upserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewForcedChannel {
    pub channel_id: i64,
    pub channel_username: Option<String>,
    pub channel_title: String,
}

/// Aggregate counters shown in the admin panel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    pub total_users: i64,
    pub total_downloads: i64,
    pub last_broadcast: Option<i64>,
}
