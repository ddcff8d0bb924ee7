//! Outbound delivery helpers.
//!
//! Every send in the bot goes through here, for two reasons: fan-out must be
//! fail-soft (one blocked recipient must not abort a broadcast), and the
//! Bot API flood control (429) needs one honored-once retry in a single
//! place instead of at every call site.

use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId, ParseMode, ReplyMarkup};
use teloxide::RequestError;

use crate::core::config;

/// Splits transport failures into "worth retrying" and "this recipient is
/// gone". Network hiccups, timeouts and flood control are transient; an
/// explicit API rejection (bot blocked, chat deleted, bad request) is final.
pub fn is_transient(err: &RequestError) -> bool {
    matches!(
        err,
        RequestError::Network(_) | RequestError::Io(_) | RequestError::RetryAfter(_) | RequestError::InvalidJson { .. }
    )
}

/// Runs a send closure with a single RetryAfter retry.
///
/// Flood control asks for a concrete pause; we honor it once. A second 429
/// in a row is returned to the caller as an ordinary error.
async fn with_flood_retry<F, Fut, T>(op: F) -> Result<T, RequestError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, RequestError>>,
{
    match op().await {
        Err(RequestError::RetryAfter(secs)) => {
            log::warn!("Flood control: retrying after {}s", secs.seconds());
            tokio::time::sleep(secs.duration()).await;
            op().await
        }
        other => other,
    }
}

/// Sends plain text, propagating errors to the caller.
pub async fn send_text(bot: &Bot, chat_id: i64, text: &str) -> Result<Message, RequestError> {
    with_flood_retry(|| async { bot.send_message(ChatId(chat_id), text).await }).await
}

/// Sends HTML-formatted text.
pub async fn send_html(bot: &Bot, chat_id: i64, text: &str) -> Result<Message, RequestError> {
    with_flood_retry(|| async {
        bot.send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .await
    })
    .await
}

/// Sends text with a reply/inline keyboard attached.
pub async fn send_with_markup<M>(bot: &Bot, chat_id: i64, text: &str, markup: M) -> Result<Message, RequestError>
where
    M: Into<ReplyMarkup> + Clone,
{
    with_flood_retry(|| async {
        bot.send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .reply_markup(markup.clone().into())
            .await
    })
    .await
}

/// Forwards a message verbatim (keeps media, entities and "forwarded from").
pub async fn forward(bot: &Bot, to: i64, from: i64, message_id: MessageId) -> Result<Message, RequestError> {
    with_flood_retry(|| async { bot.forward_message(ChatId(to), ChatId(from), message_id).await }).await
}

/// Sends an album of photos by their Telegram file ids.
pub async fn send_photo_album(bot: &Bot, chat_id: i64, file_ids: &[String]) -> Result<(), RequestError> {
    use teloxide::types::{FileId, InputMedia, InputMediaPhoto};

    if file_ids.is_empty() {
        return Ok(());
    }
    let media: Vec<InputMedia> = file_ids
        .iter()
        .map(|id| InputMedia::Photo(InputMediaPhoto::new(InputFile::file_id(FileId(id.clone())))))
        .collect();
    with_flood_retry(|| async { bot.send_media_group(ChatId(chat_id), media.clone()).await }).await?;
    Ok(())
}

/// Fail-soft variant of `send_text` for fan-out loops: logs and swallows the
/// error, returns whether the send went through.
pub async fn try_send_text(bot: &Bot, chat_id: i64, text: &str) -> bool {
    match send_text(bot, chat_id, text).await {
        Ok(_) => true,
        Err(e) => {
            if is_transient(&e) {
                log::warn!("Transient send failure to {}: {}", chat_id, e);
            } else {
                log::info!("Recipient {} rejected message: {}", chat_id, e);
            }
            false
        }
    }
}

/// Fail-soft forward for fan-out loops.
pub async fn try_forward(bot: &Bot, to: i64, from: i64, message_id: MessageId) -> bool {
    match forward(bot, to, from, message_id).await {
        Ok(_) => true,
        Err(e) => {
            if is_transient(&e) {
                log::warn!("Transient forward failure to {}: {}", to, e);
            } else {
                log::info!("Recipient {} rejected forward: {}", to, e);
            }
            false
        }
    }
}

/// Mirrors an operational event to the audit channel.
///
/// Best effort: an unreachable audit channel must never fail the operation
/// being audited, so errors are logged locally and swallowed.
pub async fn audit(bot: &Bot, text: &str) {
    let channel = *config::LOG_CHANNEL_ID;
    if channel == 0 {
        log::debug!("Audit channel not configured, skipping: {}", text);
        return;
    }
    let stamped = format!("{}\n🕒 {}", text, chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
    if let Err(e) = send_text(bot, channel, &stamped).await {
        log::error!("Failed to write audit entry: {}", e);
    }
}
