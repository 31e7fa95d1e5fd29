//! SQLite-backed store using sqlx.

use std::str::FromStr;

use {
    async_trait::async_trait,
    sqlx::{
        SqlitePool,
        sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    },
    tracing::info,
};

use crate::{
    Result, Store, now_secs,
    types::{ForcedChannel, NewForcedChannel, Statistics, StoredUser, UserProfile},
};

const SCHEMA: [&str; 3] = [
    r#"CREATE TABLE IF NOT EXISTS users (
        user_id        INTEGER PRIMARY KEY,
        username       TEXT,
        first_name     TEXT,
        last_name      TEXT,
        join_date      INTEGER NOT NULL,
        download_count INTEGER NOT NULL DEFAULT 0
    )"#,
    r#"CREATE TABLE IF NOT EXISTS forced_channels (
        channel_id       INTEGER PRIMARY KEY,
        channel_username TEXT,
        channel_title    TEXT    NOT NULL,
        added_date       INTEGER NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS statistics (
        id             INTEGER PRIMARY KEY CHECK (id = 1),
        last_broadcast INTEGER,
        updated_date   INTEGER NOT NULL
    )"#,
];

/// SQLite-backed persistence for users, forced channels and statistics.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database and initialise the schema.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::init(&pool).await?;
        info!(database_url, "store connected");
        Ok(Self { pool })
    }

    /// Build a store on an existing pool. [`SqliteStore::init`] must have run.
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create all tables if absent. Safe to run on every start.
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        for ddl in SCHEMA {
            sqlx::query(ddl).execute(pool).await?;
        }
        Ok(())
    }

    /// Fetch a single user row.
    pub async fn get_user(&self, user_id: i64) -> Result<Option<StoredUser>> {
        let row = sqlx::query_as::<_, StoredUser>(
            "SELECT user_id, username, first_name, last_name, join_date, download_count \
             FROM users WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_user(&self, user: &UserProfile) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO users (user_id, username, first_name, last_name, join_date, download_count)
               VALUES (?, ?, ?, ?, ?, 0)
               ON CONFLICT(user_id) DO UPDATE SET
                 username = excluded.username,
                 first_name = excluded.first_name,
                 last_name = excluded.last_name"#,
        )
        .bind(user.user_id)
        .bind(&user.username)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(now_secs())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn increment_download_count(&self, user_id: i64) -> Result<bool> {
        let result =
            sqlx::query("UPDATE users SET download_count = download_count + 1 WHERE user_id = ?")
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_forced_channel(&self, channel: &NewForcedChannel) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO forced_channels (channel_id, channel_username, channel_title, added_date)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(channel_id) DO UPDATE SET
                 channel_username = excluded.channel_username,
                 channel_title = excluded.channel_title"#,
        )
        .bind(channel.channel_id)
        .bind(&channel.channel_username)
        .bind(&channel.channel_title)
        .bind(now_secs())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_forced_channels(&self) -> Result<Vec<ForcedChannel>> {
        let rows = sqlx::query_as::<_, ForcedChannel>(
            "SELECT channel_id, channel_username, channel_title, added_date \
             FROM forced_channels ORDER BY added_date, channel_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_user_ids(&self) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>("SELECT user_id FROM users ORDER BY user_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn statistics(&self) -> Result<Statistics> {
        let (total_users, total_downloads) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), COALESCE(SUM(download_count), 0) FROM users",
        )
        .fetch_one(&self.pool)
        .await?;
        let last_broadcast = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT last_broadcast FROM statistics WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?
        .flatten();
        Ok(Statistics {
            total_users,
            total_downloads,
            last_broadcast,
        })
    }

    async fn record_broadcast(&self, at: i64) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO statistics (id, last_broadcast, updated_date)
               VALUES (1, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 last_broadcast = excluded.last_broadcast,
                 updated_date = excluded.updated_date"#,
        )
        .bind(at)
        .bind(now_secs())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
