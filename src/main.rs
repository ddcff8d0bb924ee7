use anyhow::Result;
use dotenvy::dotenv;
use reqwest::ClientBuilder;
use teloxide::prelude::*;

use signalbot::core::{config, init_logger};
use signalbot::storage::create_pool;
use signalbot::tasks;
use signalbot::telegram::dispatcher;

/// Main entry point.
///
/// Startup order matters: env first (config statics are lazy), then the
/// logger, then the pool (runs migrations), then the background tasks, and
/// the dispatcher loop last — it blocks until ctrl-c.
#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    let _ = dotenv();

    init_logger(&config::LOG_FILE_PATH)?;

    // Panics in spawned tasks must end up in the log, not only on stderr
    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!("Panic at {}:{}:{}", location.file(), location.line(), location.column());
        }
    }));

    if config::BOT_TOKEN.is_empty() {
        anyhow::bail!("BOT_TOKEN is not set");
    }
    if *config::SIGNAL_CHANNEL_ID == 0 {
        log::warn!("SIGNAL_CHANNEL_ID is not set, channel forwarding is disabled");
    }
    if config::admin::ADMIN_IDS.is_empty() {
        log::warn!("ADMIN_IDS is empty, nobody can confirm payments");
    }

    log::info!("Starting signalbot");

    let pool = create_pool(&config::DATABASE_PATH)?;

    // The client timeout must stay above the long-poll timeout
    let bot = Bot::with_client(
        config::BOT_TOKEN.clone(),
        ClientBuilder::new().timeout(config::network::timeout()).build()?,
    );

    tasks::spawn_expiry_sweeper(bot.clone(), pool.clone());
    tasks::spawn_backup_reporter(bot.clone(), pool.clone());

    dispatcher::run(bot, pool).await?;

    log::info!("signalbot stopped");
    Ok(())
}
