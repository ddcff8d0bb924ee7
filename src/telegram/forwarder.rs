//! Signal channel forwarder.
//!
//! Channel posts from the configured signal channel are collected behind a
//! message-id watermark (each post is forwarded at most once, replays and
//! edits of old posts are dropped) and fanned out to every active subscriber
//! plus the admins on a fixed cadence. Posts observed between cadence ticks
//! are buffered, not lost.

use std::collections::BTreeSet;
use std::time::Instant;

use teloxide::prelude::*;
use teloxide::types::MessageId;

use crate::core::config;
use crate::core::error::BotResult;
use crate::storage::db::{self, DbPool};
use crate::telegram::outbound;

/// Monotone message-id watermark over channel posts.
#[derive(Debug, Default)]
pub struct Watermark {
    last_seen: Option<i32>,
}

impl Watermark {
    /// Accepts `candidate` only if it is strictly above every id seen so
    /// far, and advances the watermark when it is.
    pub fn select_new(&mut self, candidate: i32) -> bool {
        match self.last_seen {
            Some(seen) if candidate <= seen => false,
            _ => {
                self.last_seen = Some(candidate);
                true
            }
        }
    }

    pub fn last_seen(&self) -> Option<i32> {
        self.last_seen
    }
}

/// Fan-out target set: active subscribers plus every admin, deduplicated.
/// Sorted output keeps the delivery order stable between runs.
pub fn recipients(active: &[i64], admins: &[i64]) -> Vec<i64> {
    let set: BTreeSet<i64> = active.iter().chain(admins.iter()).copied().collect();
    set.into_iter().collect()
}

pub struct Forwarder {
    channel_id: i64,
    watermark: Watermark,
    pending: Vec<MessageId>,
    last_flush: Option<Instant>,
}

impl Forwarder {
    pub fn new(channel_id: i64) -> Self {
        Forwarder {
            channel_id,
            watermark: Watermark::default(),
            pending: Vec::new(),
            last_flush: None,
        }
    }

    /// Feeds one observed channel post. Posts from other chats and posts at
    /// or below the watermark are ignored. Returns whether the post was
    /// queued for fan-out.
    pub fn observe(&mut self, chat_id: i64, message_id: MessageId) -> bool {
        if chat_id != self.channel_id {
            return false;
        }
        if !self.watermark.select_new(message_id.0) {
            log::debug!("Skipping already-seen channel post {}", message_id.0);
            return false;
        }
        self.pending.push(message_id);
        true
    }

    /// Whether the fan-out cadence has elapsed and there is work to do.
    pub fn should_flush(&self, now: Instant) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        match self.last_flush {
            Some(last) => now.duration_since(last) >= config::forwarder::interval(),
            None => true,
        }
    }

    /// Fans the buffered posts out to active subscribers and admins.
    ///
    /// Per-recipient failures are logged and skipped; the buffer is drained
    /// regardless, so a post is attempted once per recipient and never
    /// replayed.
    pub async fn flush(&mut self, bot: &Bot, pool: &DbPool) -> BotResult<()> {
        self.last_flush = Some(Instant::now());
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch: Vec<MessageId> = self.pending.drain(..).collect();

        let conn = db::get_connection(pool)?;
        let active = db::get_active_users(&conn, chrono::Utc::now())?;
        drop(conn);
        let targets = recipients(&active, config::admin::ADMIN_IDS.as_slice());

        for message_id in &batch {
            let mut delivered = 0usize;
            for target in &targets {
                if outbound::try_forward(bot, *target, self.channel_id, *message_id).await {
                    delivered += 1;
                }
                tokio::time::sleep(config::forwarder::per_recipient_delay()).await;
            }
            log::info!(
                "Forwarded channel post {} to {}/{} recipients",
                message_id.0,
                delivered,
                targets.len()
            );
            outbound::audit(
                bot,
                &format!(
                    "📤 [SIGNAL FORWARDED] msg={} доставлено {}/{}",
                    message_id.0,
                    delivered,
                    targets.len()
                ),
            )
            .await;
        }

        Ok(())
    }
}
