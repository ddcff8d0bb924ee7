//! Admin command surface and the /admin inline panel.
//!
//! Authorization is re-checked at every entry point (commands, callbacks,
//! prompted replies) against the configured admin set, and a refusal is
//! always visible ("⛔ …") rather than silent.

use chrono::Utc;
use teloxide::prelude::*;

use crate::core::config;
use crate::core::error::{BotError, BotResult};
use crate::dialogue::UserState;
use crate::storage::db::{self, DbPool};
use crate::subscription::{self, Plan};
use crate::telegram::commands::Command;
use crate::telegram::handlers::fmt_date;
use crate::telegram::{menu, outbound};

const FORBIDDEN: &str = "⛔ Эта команда доступна только администраторам.";

pub fn is_admin(user_id: i64) -> bool {
    config::admin::ADMIN_IDS.contains(&user_id)
}

/// Admin slash commands. Called from `handlers` after the user-level
/// commands have been peeled off.
pub async fn handle_command(bot: &Bot, pool: &DbPool, msg: &Message, user_id: i64, cmd: Command) -> BotResult<()> {
    let chat_id = msg.chat.id.0;

    if !is_admin(user_id) {
        log::warn!("Unauthorized admin command from {}: {:?}", user_id, cmd);
        outbound::send_text(bot, chat_id, FORBIDDEN).await?;
        return Ok(());
    }

    match cmd {
        Command::Users => show_users(bot, pool, chat_id).await,
        Command::Confirm(Some(target)) => do_confirm(bot, pool, chat_id, user_id, target).await,
        Command::Confirm(None) => {
            outbound::send_text(bot, chat_id, "Использование: /confirm <telegram_id>").await?;
            Ok(())
        }
        Command::Payments => show_payments(bot, pool, chat_id).await,
        Command::Broadcast(Some(text)) => run_broadcast(bot, pool, chat_id, user_id, &text).await,
        Command::Broadcast(None) => prompt_broadcast(bot, pool, chat_id, user_id).await,
        Command::Stats => show_stats(bot, pool, chat_id).await,
        Command::AdminPanel => {
            outbound::send_with_markup(bot, chat_id, "🛠 <b>Панель администратора</b>", menu::admin_panel()).await?;
            Ok(())
        }
        Command::TestLog => {
            outbound::audit(bot, "🧪 [TEST] Проверка канала логов").await;
            outbound::send_text(bot, chat_id, "Отправил тестовую запись в лог-канал.").await?;
            Ok(())
        }
        Command::TestForward => {
            outbound::send_text(bot, chat_id, "🧪 Тестовый сигнал: так выглядит пересланное сообщение.").await?;
            Ok(())
        }
        Command::TestDb => {
            let conn = db::get_connection(pool)?;
            let stats = db::get_database_stats(&conn)?;
            drop(conn);
            outbound::send_text(
                bot,
                chat_id,
                &format!(
                    "🧪 База доступна: {} пользователей, {} платежей.",
                    stats.total_users, stats.total_payments
                ),
            )
            .await?;
            Ok(())
        }
        // User-level commands are handled before we get here
        Command::Start | Command::Status | Command::Help => Ok(()),
    }
}

/// Inline panel callbacks (admin_*, confirm_<id>, back_*).
pub async fn handle_callback(bot: &Bot, pool: &DbPool, q: &CallbackQuery) -> BotResult<()> {
    let user_id = q.from.id.0 as i64;
    let Some(data) = q.data.as_deref() else {
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };
    let Some(chat_id) = q.message.as_ref().map(|m| m.chat().id.0) else {
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };

    // Inline buttons survive in chat history, so the auth check has to
    // happen per tap, not per render.
    if !is_admin(user_id) {
        log::warn!("Unauthorized callback from {}: {}", user_id, data);
        bot.answer_callback_query(q.id.clone()).text(FORBIDDEN).await?;
        return Ok(());
    }

    bot.answer_callback_query(q.id.clone()).await?;

    match data {
        "admin_users" => show_users(bot, pool, chat_id).await,
        "admin_payments" => show_payments(bot, pool, chat_id).await,
        "admin_stats" => show_stats(bot, pool, chat_id).await,
        "admin_broadcast" => prompt_broadcast(bot, pool, chat_id, user_id).await,
        "admin_search" => prompt_user_search(bot, pool, chat_id, user_id).await,
        "back_admin_panel" => {
            outbound::send_with_markup(bot, chat_id, "🛠 <b>Панель администратора</b>", menu::admin_panel()).await?;
            Ok(())
        }
        "back_main" => {
            outbound::send_with_markup(bot, chat_id, "Главное меню 👇", menu::main_menu()).await?;
            Ok(())
        }
        other => {
            if let Some(target) = other.strip_prefix("confirm_").and_then(|s| s.parse::<i64>().ok()) {
                do_confirm(bot, pool, chat_id, user_id, target).await
            } else {
                log::debug!("Unknown callback data: {}", other);
                Ok(())
            }
        }
    }
}

/// Confirms the target's payment, activates the subscription, notifies the
/// user and mirrors the event to the audit channel.
async fn do_confirm(bot: &Bot, pool: &DbPool, chat_id: i64, admin_id: i64, target: i64) -> BotResult<()> {
    let now = Utc::now();
    let conn = db::get_connection(pool)?;
    let result = subscription::confirm(&conn, config::admin::ADMIN_IDS.as_slice(), admin_id, target, now);
    drop(conn);

    let confirmation = match result {
        Ok(c) => c,
        Err(BotError::UserNotFound(id)) => {
            outbound::send_text(bot, chat_id, &format!("Пользователь {} не найден в базе.", id)).await?;
            return Ok(());
        }
        Err(BotError::NoPlanSelected(id)) => {
            outbound::send_text(
                bot,
                chat_id,
                &format!("У пользователя {} не выбран тариф — подтверждать нечего.", id),
            )
            .await?;
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let until = match confirmation.end_date {
        Some(end) => format!("до {}", end.format("%d.%m.%Y")),
        None => "бессрочно".to_string(),
    };

    // The user may have blocked the bot; the confirmation itself stands
    let notified = outbound::try_send_text(
        bot,
        target,
        &format!(
            "🎉 Оплата подтверждена!\n\nПодписка «{}» активна {}.\nСигналы будут приходить сюда автоматически.",
            confirmation.plan.name, until
        ),
    )
    .await;

    outbound::send_text(
        bot,
        chat_id,
        &format!(
            "✅ Подтверждено: @{} (id={}), тариф {}, {}{}",
            confirmation.username.as_deref().unwrap_or("-"),
            target,
            confirmation.plan.key,
            until,
            if notified { "" } else { " (уведомить не удалось)" }
        ),
    )
    .await?;

    outbound::audit(
        bot,
        &format!(
            "✅ [CONFIRMED] user=@{} (id={}) plan={} {} by admin={} (закрыто платежей: {})",
            confirmation.username.as_deref().unwrap_or("-"),
            target,
            confirmation.plan.key,
            until,
            admin_id,
            confirmation.payments_closed
        ),
    )
    .await;

    log::info!("Payment confirmed for {} by admin {}", target, admin_id);
    Ok(())
}

async fn show_users(bot: &Bot, pool: &DbPool, chat_id: i64) -> BotResult<()> {
    let conn = db::get_connection(pool)?;
    let users = db::get_all_users(&conn)?;
    drop(conn);

    if users.is_empty() {
        outbound::send_text(bot, chat_id, "В базе пока нет пользователей.").await?;
        return Ok(());
    }

    let mut text = format!("👥 <b>Пользователи</b> (всего {}):\n\n", users.len());
    for user in users.iter().take(50) {
        let plan = Plan::from_key(&user.plan).map(|p| p.key).unwrap_or("-");
        text.push_str(&format!(
            "• <code>{}</code> @{} — {} / {}\n",
            user.telegram_id,
            user.username.as_deref().unwrap_or("-"),
            user.status,
            plan
        ));
    }
    if users.len() > 50 {
        text.push_str(&format!("\n…и ещё {}. Используйте поиск.", users.len() - 50));
    }

    outbound::send_with_markup(bot, chat_id, &text, menu::admin_back()).await?;
    Ok(())
}

async fn show_payments(bot: &Bot, pool: &DbPool, chat_id: i64) -> BotResult<()> {
    let conn = db::get_connection(pool)?;
    let payments = db::get_latest_payments(&conn, 20)?;
    drop(conn);

    if payments.is_empty() {
        outbound::send_text(bot, chat_id, "Платежей пока нет.").await?;
        return Ok(());
    }

    let mut text = "💳 <b>Последние платежи</b>:\n\n".to_string();
    for p in &payments {
        let status_icon = match p.status.as_str() {
            "confirmed" => "✅",
            "rejected" => "❌",
            _ => "⏳",
        };
        text.push_str(&format!(
            "{} #{} @{} — {} / {} ({})\n",
            status_icon,
            p.payment_id,
            p.username.as_deref().unwrap_or("-"),
            p.plan.as_deref().unwrap_or("-"),
            p.payment_method,
            fmt_date(&p.created_at)
        ));
    }

    outbound::send_with_markup(bot, chat_id, &text, menu::admin_back()).await?;
    Ok(())
}

async fn show_stats(bot: &Bot, pool: &DbPool, chat_id: i64) -> BotResult<()> {
    let conn = db::get_connection(pool)?;
    let stats = db::get_database_stats(&conn)?;
    drop(conn);

    let mut text = format!(
        "📊 <b>Статистика</b>\n\nВсего пользователей: {}\nАктивных подписок: {}\nВсего платежей: {}\n",
        stats.total_users, stats.active_users, stats.total_payments
    );
    if !stats.users_by_plan.is_empty() {
        text.push_str("\nПо тарифам:\n");
        for (plan, count) in &stats.users_by_plan {
            text.push_str(&format!("• {} — {}\n", plan, count));
        }
    }
    if !stats.payments_by_status.is_empty() {
        text.push_str("\nПлатежи:\n");
        for (status, count) in &stats.payments_by_status {
            text.push_str(&format!("• {} — {}\n", status, count));
        }
    }

    outbound::send_with_markup(bot, chat_id, &text, menu::admin_back()).await?;
    Ok(())
}

async fn prompt_broadcast(bot: &Bot, pool: &DbPool, chat_id: i64, admin_id: i64) -> BotResult<()> {
    let conn = db::get_connection(pool)?;
    db::set_user_state(&conn, admin_id, Some(&UserState::WaitingBroadcast.encode()))?;
    drop(conn);
    outbound::send_text(
        bot,
        chat_id,
        "📣 Пришлите текст рассылки следующим сообщением (или «↩️ Назад» для отмены).",
    )
    .await?;
    Ok(())
}

/// Sends `text` to every active subscriber. Fail-soft per recipient with a
/// pacing delay; reports delivered/failed back to the admin.
pub async fn run_broadcast(bot: &Bot, pool: &DbPool, chat_id: i64, admin_id: i64, text: &str) -> BotResult<()> {
    if !is_admin(admin_id) {
        outbound::send_text(bot, chat_id, FORBIDDEN).await?;
        return Ok(());
    }

    let conn = db::get_connection(pool)?;
    db::set_user_state(&conn, admin_id, None)?;
    let users = db::get_active_users(&conn, Utc::now())?;
    drop(conn);

    let mut sent = 0usize;
    let mut failed = 0usize;
    for user_id in &users {
        if outbound::try_send_text(bot, *user_id, text).await {
            sent += 1;
        } else {
            failed += 1;
        }
        tokio::time::sleep(config::broadcast::per_recipient_delay()).await;
    }

    log::info!("Broadcast by {}: {} sent, {} failed", admin_id, sent, failed);
    outbound::send_text(
        bot,
        chat_id,
        &format!("📣 Рассылка завершена: доставлено {}, не доставлено {}.", sent, failed),
    )
    .await?;
    outbound::audit(
        bot,
        &format!("📣 [BROADCAST] by admin={} delivered={} failed={}", admin_id, sent, failed),
    )
    .await;
    Ok(())
}

async fn prompt_user_search(bot: &Bot, pool: &DbPool, chat_id: i64, admin_id: i64) -> BotResult<()> {
    let conn = db::get_connection(pool)?;
    db::set_user_state(&conn, admin_id, Some(&UserState::WaitingUserSearch.encode()))?;
    drop(conn);
    outbound::send_text(bot, chat_id, "🔍 Пришлите telegram_id или username для поиска.").await?;
    Ok(())
}

/// Looks a user up by exact id or username substring and prints the card.
pub async fn run_user_search(bot: &Bot, pool: &DbPool, chat_id: i64, admin_id: i64, query: &str) -> BotResult<()> {
    if !is_admin(admin_id) {
        outbound::send_text(bot, chat_id, FORBIDDEN).await?;
        return Ok(());
    }

    let conn = db::get_connection(pool)?;
    db::set_user_state(&conn, admin_id, None)?;

    let query = query.trim().trim_start_matches('@');
    let found: Vec<db::User> = if let Ok(id) = query.parse::<i64>() {
        db::get_user(&conn, id)?.into_iter().collect()
    } else {
        let needle = query.to_lowercase();
        db::get_all_users(&conn)?
            .into_iter()
            .filter(|u| {
                u.username
                    .as_deref()
                    .map(|n| n.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
            .take(5)
            .collect()
    };
    drop(conn);

    if found.is_empty() {
        outbound::send_text(bot, chat_id, &format!("Никого не нашёл по запросу «{}».", query)).await?;
        return Ok(());
    }

    for user in &found {
        let text = format!(
            "👤 <code>{}</code> @{}\nСтатус: {}\nТариф: {}\nДо: {}\nВ базе с: {}",
            user.telegram_id,
            user.username.as_deref().unwrap_or("-"),
            user.status,
            user.plan,
            user.end_date.as_deref().map(fmt_date).unwrap_or_else(|| "-".to_string()),
            fmt_date(&user.joined_at)
        );
        outbound::send_with_markup(bot, chat_id, &text, menu::confirm_button(user.telegram_id)).await?;
    }
    Ok(())
}
