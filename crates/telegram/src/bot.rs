//! Update sources: long polling and the webhook server.

use std::{sync::Arc, time::Duration};

use {
    axum::{
        Json, Router,
        body::Bytes,
        extract::State,
        http::{HeaderMap, StatusCode},
        routing::{get, post},
    },
    rand::RngCore,
    serde_json::json,
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, BotCommand, Update},
    },
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
    url::Url,
};

use crate::{
    config::{BotConfig, UpdateMode, WEBHOOK_PATH},
    dispatcher::Dispatcher,
    handlers,
};

/// Header Telegram uses to echo the webhook secret token.
pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Updates buffered between the webhook server and the worker.
const WEBHOOK_QUEUE: usize = 256;

const LONG_POLL_TIMEOUT_SECS: u32 = 30;

fn allowed_updates() -> Vec<AllowedUpdate> {
    vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery]
}

/// Build a bot whose HTTP client outlives the long-polling timeout, so the
/// client doesn't abort the request before Telegram responds.
pub fn build_bot(config: &BotConfig) -> anyhow::Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(u64::from(LONG_POLL_TIMEOUT_SECS) + 15))
        .build()?;
    Ok(Bot::with_client(config.token(), client))
}

/// Verify the token, register commands and feed updates to the dispatcher
/// until `cancel` fires.
pub async fn run(
    bot: Bot,
    config: &BotConfig,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let me = bot.get_me().await?;
    info!(username = ?me.username, "telegram bot connected");
    register_commands(&bot).await;

    match config.update_mode()? {
        UpdateMode::Polling => start_polling(bot, dispatcher, cancel).await,
        UpdateMode::Webhook { url, port } => {
            serve_webhook(bot, dispatcher, url, port, cancel).await
        },
    }
}

async fn register_commands(bot: &Bot) {
    let commands = vec![
        BotCommand::new("start", "Show help"),
        BotCommand::new("admin", "Admin panel"),
        BotCommand::new("cancel", "Abort a pending admin prompt"),
    ];
    if let Err(e) = bot.set_my_commands(commands).await {
        warn!("failed to register bot commands: {e}");
    }
}

/// Long-poll `getUpdates`, handling each update to completion before asking
/// for the next batch.
pub async fn start_polling(
    bot: Bot,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    // Delete any existing webhook so long polling works.
    bot.delete_webhook().send().await?;
    info!("starting telegram polling loop (webhook cleared)");

    let mut offset: i32 = 0;
    loop {
        let result = tokio::select! {
            () = cancel.cancelled() => {
                info!("telegram polling stopped");
                return Ok(());
            },
            result = bot
                .get_updates()
                .offset(offset)
                .timeout(LONG_POLL_TIMEOUT_SECS)
                .allowed_updates(allowed_updates())
                .send() => result,
        };

        match result {
            Ok(updates) => {
                debug!(count = updates.len(), "got telegram updates");
                for update in updates {
                    offset = update.id.as_offset();
                    handlers::handle_update(&dispatcher, update).await;
                }
            },
            Err(RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) => {
                anyhow::bail!("another bot instance is already running with this token");
            },
            Err(e) => {
                warn!(error = %e, "telegram getUpdates failed");
                tokio::time::sleep(Duration::from_secs(5)).await;
            },
        }
    }
}

#[derive(Clone)]
struct WebhookState {
    secret: Arc<str>,
    updates: mpsc::Sender<Update>,
}

fn generate_webhook_secret() -> String {
    let mut bytes = [0_u8; 24];
    rand::rng().fill_bytes(&mut bytes);
    let mut out = String::with_capacity(bytes.len() * 2);
    const HEX: &[u8; 16] = b"0123456789abcdef";
    for b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}

fn webhook_router(state: WebhookState) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(webhook_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn webhook_handler(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let presented = headers
        .get(SECRET_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    if presented != Some(&*state.secret) {
        warn!("rejected webhook request with a bad secret token");
        return StatusCode::UNAUTHORIZED;
    }

    // Acknowledge malformed updates so Telegram does not redeliver them.
    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!(error = %e, "ignoring malformed telegram update");
            return StatusCode::OK;
        },
    };

    match state.updates.send(update).await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Register the webhook and serve it on `0.0.0.0:port`. Updates are handed
/// to a single worker in arrival order.
pub async fn serve_webhook(
    bot: Bot,
    dispatcher: Arc<Dispatcher>,
    url: Url,
    port: u16,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let secret = generate_webhook_secret();
    bot.set_webhook(url.clone())
        .secret_token(secret.clone())
        .allowed_updates(allowed_updates())
        .await?;
    info!(%url, "telegram webhook registered");

    let (tx, mut rx) = mpsc::channel::<Update>(WEBHOOK_QUEUE);
    let worker = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            handlers::handle_update(&dispatcher, update).await;
        }
        debug!("webhook worker drained");
    });

    let app = webhook_router(WebhookState {
        secret: Arc::from(secret),
        updates: tx,
    });
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "webhook server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    if let Err(e) = worker.await {
        error!(error = %e, "webhook worker panicked");
    }
    info!("webhook server stopped");
    Ok(())
}
