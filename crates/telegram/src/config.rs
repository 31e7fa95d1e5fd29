use {
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    url::Url,
};

use crate::{Error, Result};

/// Path the webhook server listens on, appended to the public base URL.
pub const WEBHOOK_PATH: &str = "/telegram/webhook";

/// How updates reach the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateMode {
    /// Long-poll `getUpdates`.
    Polling,
    /// Telegram pushes updates to `url`; the server binds `0.0.0.0:port`.
    Webhook { url: Url, port: u16 },
}

/// Runtime configuration for the bot.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Bot token from @BotFather.
    pub token: Secret<String>,

    /// User ids allowed to use the admin panel.
    pub admin_ids: Vec<i64>,

    /// Externally reachable base URL. Enables webhook mode when set.
    pub webhook_url: Option<String>,

    /// Listen port for webhook mode.
    pub port: u16,

    /// Maximum concurrent sends during a broadcast.
    pub broadcast_concurrency: usize,
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"[REDACTED]")
            .field("admin_ids", &self.admin_ids)
            .field("webhook_url", &self.webhook_url)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            admin_ids: Vec::new(),
            webhook_url: None,
            port: 8443,
            broadcast_concurrency: 8,
        }
    }
}

impl BotConfig {
    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }

    /// Resolve the update mode. The webhook endpoint is the base URL with
    /// [`WEBHOOK_PATH`] appended.
    pub fn update_mode(&self) -> Result<UpdateMode> {
        let Some(base) = self
            .webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
        else {
            return Ok(UpdateMode::Polling);
        };
        let url = Url::parse(&format!("{}{WEBHOOK_PATH}", base.trim_end_matches('/')))
            .map_err(|e| Error::external(format!("invalid webhook url {base:?}"), e))?;
        Ok(UpdateMode::Webhook {
            url,
            port: self.port,
        })
    }
}
