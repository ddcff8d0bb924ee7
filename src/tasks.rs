//! Background tasks: the daily expiry sweep and the daily backup/report.
//!
//! Both are plain tokio tasks with their own cadence. The sweep shortens
//! its interval after a failed run; the backup task wakes hourly and uses a
//! date guard so the work itself happens once per calendar day no matter
//! how often the task is restarted.

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use teloxide::prelude::*;
use tokio::task::JoinHandle;

use crate::core::config;
use crate::core::error::BotResult;
use crate::storage::db::{self, DbPool};
use crate::storage::backup;
use crate::subscription;
use crate::telegram::outbound;

/// Daily expiry sweep: demotes lapsed subscriptions, notifies the affected
/// users and sends tomorrow-expiry reminders. Retries hourly after an error.
pub fn spawn_expiry_sweeper(bot: Bot, pool: DbPool) -> JoinHandle<()> {
    tokio::spawn(async move {
        log::info!("Expiry sweeper started");
        loop {
            let pause = match run_sweep(&bot, &pool).await {
                Ok(()) => config::sweep::interval(),
                Err(e) => {
                    log::error!("Expiry sweep failed: {}", e);
                    config::sweep::retry_interval()
                }
            };
            tokio::time::sleep(pause).await;
        }
    })
}

async fn run_sweep(bot: &Bot, pool: &DbPool) -> BotResult<()> {
    let now = Utc::now();
    let conn = db::get_connection(pool)?;
    let expired = subscription::sweep_expirations(&conn, now)?;
    let tomorrow = (now + ChronoDuration::days(1)).date_naive();
    let expiring = db::get_users_expiring_on(&conn, tomorrow)?;
    drop(conn);

    for user in &expired {
        log::info!("Subscription expired for {}", user.telegram_id);
        outbound::try_send_text(
            bot,
            user.telegram_id,
            "⚠️ Ваша подписка на сигналы истекла.\n\nПродлить её можно в разделе «💰 Оплата» — сигналы снова начнут приходить сразу после подтверждения.",
        )
        .await;
        outbound::audit(
            bot,
            &format!(
                "⌛ [EXPIRED] user=@{} (id={})",
                user.username.as_deref().unwrap_or("-"),
                user.telegram_id
            ),
        )
        .await;
    }

    for user in &expiring {
        outbound::try_send_text(
            bot,
            user.telegram_id,
            "⏰ Напоминание: ваша подписка на сигналы истекает завтра.\nПродлите её в разделе «💰 Оплата», чтобы не пропустить сигналы.",
        )
        .await;
    }

    if !expired.is_empty() || !expiring.is_empty() {
        log::info!("Sweep done: {} expired, {} reminded", expired.len(), expiring.len());
    }
    Ok(())
}

/// Daily backup + report task.
///
/// Wakes once an hour; the date guard fires the real work on the first tick
/// of each new calendar day. A failed run leaves the guard untouched, so the
/// next hourly tick retries.
pub fn spawn_backup_reporter(bot: Bot, pool: DbPool) -> JoinHandle<()> {
    tokio::spawn(async move {
        log::info!("Backup/report task started");
        let mut last_done: Option<NaiveDate> = None;
        loop {
            let today = Utc::now().date_naive();
            if last_done != Some(today) {
                match run_backup_and_report(&bot, &pool).await {
                    Ok(()) => last_done = Some(today),
                    Err(e) => log::error!("Backup/report failed: {}", e),
                }
            }
            tokio::time::sleep(config::backup::check_interval()).await;
        }
    })
}

async fn run_backup_and_report(bot: &Bot, pool: &DbPool) -> BotResult<()> {
    // The report still goes out when only the file copy failed
    match backup::create_backup(config::DATABASE_PATH.as_str()) {
        Ok(path) => {
            outbound::audit(bot, &format!("🗄 [BACKUP] Создан: {}", path.display())).await;
        }
        Err(e) => {
            log::error!("Database backup failed: {}", e);
            outbound::audit(bot, &format!("🗄 [BACKUP] ОШИБКА: {}", e)).await;
        }
    }

    // The report covers the day that just ended
    let yesterday = Utc::now().date_naive() - ChronoDuration::days(1);
    let conn = db::get_connection(pool)?;
    let stats = db::get_daily_stats(&conn, yesterday)?;
    drop(conn);

    outbound::audit(
        bot,
        &format!(
            "📊 [DAILY REPORT] {}\nНовых пользователей: {}\nНовых платежей: {}\nИстекло подписок: {}\nАктивных сейчас: {}",
            yesterday.format("%d.%m.%Y"),
            stats.new_users,
            stats.new_payments,
            stats.expired_users,
            stats.active_users
        ),
    )
    .await;

    Ok(())
}
