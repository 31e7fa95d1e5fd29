mod config;

use std::sync::Arc;

use {
    clap::Parser,
    reelbot_media::{MediaFetcher, PlatformFetcher},
    reelbot_store::StoreHandle,
    reelbot_telegram::{ChatTransport, Dispatcher, TelegramOutbound, bot},
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use crate::config::Cli;

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "reelbot starting");

    let config = cli.bot_config()?;

    let store = StoreHandle::connect(&cli.database_url()).await;
    if !store.is_available() {
        warn!("running without a database: users, channels and stats are not persisted");
    }

    let fetcher: Arc<dyn MediaFetcher> =
        Arc::new(PlatformFetcher::new(cli.extractor(), cli.fetch_config()));

    let telegram = bot::build_bot(&config)?;
    let transport: Arc<dyn ChatTransport> = Arc::new(TelegramOutbound::new(telegram.clone()));
    let dispatcher = Arc::new(Dispatcher::new(&config, store, fetcher, transport));

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            shutdown.cancel();
        }
    });

    bot::run(telegram, &config, dispatcher, cancel).await?;
    info!("reelbot stopped");
    Ok(())
}
