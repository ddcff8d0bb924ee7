//! Long-poll update dispatcher.
//!
//! One loop owns the getUpdates cursor, routes each update to the right
//! handler and piggybacks the forwarder's fan-out cadence between polls.
//! The cursor is the only deduplication mechanism: an update is either
//! acknowledged by advancing the offset or redelivered by Telegram on the
//! next poll.

use std::time::Instant;

use teloxide::prelude::*;
use teloxide::types::UpdateKind;

use crate::core::config;
use crate::core::error::BotResult;
use crate::storage::db::DbPool;
use crate::telegram::forwarder::Forwarder;
use crate::telegram::{admin, handlers, outbound};

/// Monotone getUpdates cursor.
///
/// Holds the next offset to request. `accept` takes an update's
/// `id.as_offset()` (update_id + 1) and rejects replays: anything at or
/// below the current cursor has already been processed.
#[derive(Debug, Default)]
pub struct PollCursor {
    next: Option<i32>,
}

impl PollCursor {
    /// Advances the cursor past this update. Returns false for replays.
    pub fn accept(&mut self, offset_after_update: i32) -> bool {
        match self.next {
            Some(n) if offset_after_update <= n => false,
            _ => {
                self.next = Some(offset_after_update);
                true
            }
        }
    }

    /// Offset for the next getUpdates call; None until the first update.
    pub fn offset(&self) -> Option<i32> {
        self.next
    }
}

/// Runs the dispatch loop until ctrl-c.
pub async fn run(bot: Bot, pool: DbPool) -> BotResult<()> {
    let mut cursor = PollCursor::default();
    let mut forwarder = Forwarder::new(*config::SIGNAL_CHANNEL_ID);

    log::info!("Dispatcher started (poll timeout {}s)", config::poll::TIMEOUT_SECS);
    outbound::audit(&bot, "🤖 [BOT] Запущен").await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Shutdown requested, stopping dispatcher");
                break;
            }
            result = poll_once(&bot, &pool, &mut cursor, &mut forwarder) => {
                if let Err(e) = result {
                    log::warn!("Poll cycle failed: {}", e);
                    tokio::time::sleep(config::poll::error_backoff()).await;
                }
            }
        }

        if forwarder.should_flush(Instant::now()) {
            if let Err(e) = forwarder.flush(&bot, &pool).await {
                log::error!("Forwarder flush failed: {}", e);
            }
        }
    }

    outbound::audit(&bot, "🤖 [BOT] Остановлен").await;
    Ok(())
}

/// One getUpdates round trip plus dispatch of everything it returned.
async fn poll_once(bot: &Bot, pool: &DbPool, cursor: &mut PollCursor, forwarder: &mut Forwarder) -> BotResult<()> {
    let mut request = bot.get_updates().timeout(config::poll::TIMEOUT_SECS);
    if let Some(offset) = cursor.offset() {
        request = request.offset(offset);
    }
    let updates = request.await?;

    for update in updates {
        if !cursor.accept(update.id.as_offset()) {
            log::debug!("Dropping replayed update {}", update.id.0);
            continue;
        }
        dispatch_update(bot, pool, forwarder, update).await;
    }

    Ok(())
}

/// Routes one update. Per-envelope error catching: a failing handler is
/// logged and the loop moves on, it never tears down the dispatcher.
async fn dispatch_update(bot: &Bot, pool: &DbPool, forwarder: &mut Forwarder, update: Update) {
    let update_id = update.id.0;
    let result = match update.kind {
        UpdateKind::Message(msg) => handlers::handle_message(bot, pool, &msg).await,
        UpdateKind::CallbackQuery(q) => admin::handle_callback(bot, pool, &q).await,
        UpdateKind::ChannelPost(post) => {
            forwarder.observe(post.chat.id.0, post.id);
            Ok(())
        }
        // Edits never re-forward: the watermark already covers the id
        UpdateKind::EditedChannelPost(_) => Ok(()),
        _ => Ok(()),
    };

    match result {
        Ok(()) => {}
        // Transient noise stays out of the audit channel
        Err(crate::core::BotError::TransportTransient(e)) => {
            log::warn!("Transient failure on update {}: {}", update_id, e);
        }
        Err(e) => {
            log::error!("Failed to handle update {}: {}", update_id, e);
            outbound::audit(bot, &format!("🛑 [ERROR] update={}: {}", update_id, e)).await;
        }
    }
}
