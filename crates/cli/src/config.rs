use std::{path::PathBuf, time::Duration};

use {
    clap::Parser,
    reelbot_media::{FetchConfig, YtDlpExtractor},
    reelbot_telegram::BotConfig,
    secrecy::Secret,
};

#[derive(Parser)]
#[command(
    name = "reelbot",
    version,
    about = "Telegram bot that downloads YouTube and Instagram media"
)]
pub struct Cli {
    /// Bot token from @BotFather.
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub telegram_bot_token: Option<String>,

    /// sqlx SQLite URL. Takes precedence over `--db-name`.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Database file stem used when no URL is given.
    #[arg(long, env = "DB_NAME", default_value = "telegram_bot")]
    pub db_name: String,

    /// Comma-separated admin user ids.
    #[arg(long, env = "ADMIN_IDS", default_value = "")]
    pub admin_ids: String,

    /// Public base URL. Enables webhook mode when set.
    #[arg(long, env = "WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Webhook listen port.
    #[arg(long, env = "PORT", default_value_t = 8443)]
    pub port: u16,

    #[arg(long, env = "DOWNLOAD_DIR", default_value = "downloads")]
    pub download_dir: PathBuf,

    #[arg(long, env = "YTDLP_PATH", default_value = "yt-dlp")]
    pub ytdlp_path: PathBuf,

    /// Largest file the bot will upload, in MiB.
    #[arg(long, env = "MAX_UPLOAD_MB", default_value_t = 50)]
    pub max_upload_mb: u64,

    /// Kill the extractor after this many seconds.
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 600)]
    pub fetch_timeout_secs: u64,

    #[arg(long, env = "BROADCAST_CONCURRENCY", default_value_t = 8)]
    pub broadcast_concurrency: usize,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    pub json_logs: bool,
}

/// Startup configuration errors. These are the only fatal errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("TELEGRAM_BOT_TOKEN is not set")]
    MissingToken,

    #[error("invalid admin id {value:?} in ADMIN_IDS")]
    InvalidAdminId { value: String },
}

/// Parse `"1, 2,3"` into ids. Empty entries are skipped.
pub fn parse_admin_ids(raw: &str) -> Result<Vec<i64>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().map_err(|_| ConfigError::InvalidAdminId {
                value: s.to_string(),
            })
        })
        .collect()
}

impl Cli {
    pub fn bot_config(&self) -> Result<BotConfig, ConfigError> {
        let token = self
            .telegram_bot_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingToken)?;
        Ok(BotConfig {
            token: Secret::new(token.to_string()),
            admin_ids: parse_admin_ids(&self.admin_ids)?,
            webhook_url: self.webhook_url.clone(),
            port: self.port,
            broadcast_concurrency: self.broadcast_concurrency,
        })
    }

    pub fn database_url(&self) -> String {
        match self.database_url.as_deref().filter(|u| !u.trim().is_empty()) {
            Some(url) => url.to_string(),
            None => format!("sqlite://{}.db?mode=rwc", self.db_name),
        }
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            download_dir: self.download_dir.clone(),
            max_file_bytes: self.max_upload_mb.saturating_mul(1024 * 1024),
        }
    }

    pub fn extractor(&self) -> YtDlpExtractor {
        YtDlpExtractor::new(
            self.ytdlp_path.clone(),
            Duration::from_secs(self.fetch_timeout_secs),
        )
    }
}
