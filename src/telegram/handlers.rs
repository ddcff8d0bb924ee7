//! User-facing message handling: main menu, subscription status and the
//! payment dialogue.
//!
//! Dispatch priority for a private message: slash command, then menu button,
//! then whatever the stored dialogue state is waiting for; anything else is
//! dropped. Every message also refreshes the user row (`upsert_user`) before
//! any routing happens.

use chrono::{DateTime, Utc};
use teloxide::prelude::*;
use teloxide::types::ChatKind;

use crate::core::config;
use crate::core::error::{BotError, BotResult};
use crate::dialogue::UserState;
use crate::storage::db::{self, DbPool};
use crate::subscription::{self, DisplayStatus, PaymentMethod, Plan, ProofRef, PLANS};
use crate::telegram::commands::{classify, Command, Incoming, MenuButton};
use crate::telegram::{admin, menu, outbound};

/// Entry point for every private message.
pub async fn handle_message(bot: &Bot, pool: &DbPool, msg: &Message) -> BotResult<()> {
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };
    if !matches!(msg.chat.kind, ChatKind::Private(_)) {
        return Ok(());
    }

    let user_id = from.id.0 as i64;
    let chat_id = msg.chat.id.0;
    let username = from.username.as_deref();
    let now = Utc::now();

    let conn = db::get_connection(pool)?;
    let is_new = db::upsert_user(&conn, user_id, username, now)?;
    if is_new {
        log::info!("New user: {} (@{})", user_id, username.unwrap_or("-"));
        outbound::audit(
            bot,
            &format!("👤 [NEW USER] id={} username=@{}", user_id, username.unwrap_or("-")),
        )
        .await;
    }

    let state = db::get_user_state(&conn, user_id)?.as_deref().and_then(UserState::parse);
    drop(conn);

    // A photo while we wait for one is the payment proof, regardless of
    // any caption text.
    if msg.photo().is_some() {
        if let Some(UserState::WaitingScreenshot { method, plan }) = &state {
            return handle_screenshot(bot, pool, msg, user_id, *method, plan).await;
        }
    }

    let Some(text) = msg.text() else {
        return Ok(());
    };

    match classify(text) {
        Incoming::Command(Command::Start) => show_start(bot, pool, chat_id, user_id).await,
        Incoming::Command(Command::Status) => show_status(bot, pool, chat_id, user_id).await,
        Incoming::Command(Command::Help) => show_help(bot, chat_id).await,
        Incoming::Command(cmd) => admin::handle_command(bot, pool, msg, user_id, cmd).await,

        Incoming::Button(MenuButton::GetSignals) => show_get_signals(bot, pool, chat_id, user_id).await,
        Incoming::Button(MenuButton::Pay) => show_payment_intro(bot, pool, chat_id, user_id).await,
        Incoming::Button(MenuButton::MyStatus) => show_status(bot, pool, chat_id, user_id).await,
        Incoming::Button(MenuButton::Support) => show_support(bot, chat_id).await,
        Incoming::Button(MenuButton::Help) => show_help(bot, chat_id).await,
        Incoming::Button(MenuButton::Back) => handle_back(bot, pool, chat_id, user_id, state).await,
        Incoming::Button(MenuButton::PlanPick(plan_key)) => {
            show_payment_methods(bot, pool, chat_id, user_id, plan_key).await
        }
        Incoming::Button(MenuButton::PayCrypto) => {
            start_screenshot_wait(bot, pool, chat_id, user_id, PaymentMethod::Crypto, state).await
        }
        Incoming::Button(MenuButton::PayTribute) => {
            start_screenshot_wait(bot, pool, chat_id, user_id, PaymentMethod::Tribute, state).await
        }
        Incoming::Button(MenuButton::SendScreenshot) => {
            outbound::send_text(bot, chat_id, "Просто пришлите фото (скриншот перевода) следующим сообщением 📸")
                .await?;
            Ok(())
        }

        Incoming::Text(text) => handle_free_text(bot, pool, chat_id, user_id, state, &text).await,
    }
}

async fn show_start(bot: &Bot, pool: &DbPool, chat_id: i64, user_id: i64) -> BotResult<()> {
    let conn = db::get_connection(pool)?;
    db::set_user_state(&conn, user_id, None)?;
    drop(conn);

    let text = "👋 Добро пожаловать в <b>PTT Signals</b>!\n\n\
        Здесь вы получаете торговые сигналы из закрытого канала.\n\
        Оформите подписку — и каждый сигнал будет приходить вам в личные сообщения.\n\n\
        Выберите действие в меню ниже 👇";
    outbound::send_with_markup(bot, chat_id, text, menu::main_menu()).await?;
    Ok(())
}

async fn show_get_signals(bot: &Bot, pool: &DbPool, chat_id: i64, user_id: i64) -> BotResult<()> {
    let conn = db::get_connection(pool)?;
    let now = Utc::now();
    let user = db::get_user(&conn, user_id)?.ok_or(BotError::UserNotFound(user_id))?;
    let status = subscription::compute_display_status(&conn, &user, now)?;
    drop(conn);

    match status {
        DisplayStatus::Active | DisplayStatus::ActiveLifetime => {
            outbound::send_text(
                bot,
                chat_id,
                "✅ Подписка активна — сигналы уже приходят вам автоматически.\nНичего настраивать не нужно.",
            )
            .await?;
            Ok(())
        }
        DisplayStatus::Pending => {
            outbound::send_text(
                bot,
                chat_id,
                "⏳ Ваша оплата на проверке. Как только администратор подтвердит её, сигналы начнут приходить автоматически.",
            )
            .await?;
            Ok(())
        }
        DisplayStatus::Expired | DisplayStatus::Inactive => {
            // Show what subscribers get before asking for money
            let examples = config::SIGNAL_EXAMPLES.as_slice();
            if !examples.is_empty() {
                if let Err(e) = outbound::send_photo_album(bot, chat_id, examples).await {
                    log::warn!("Failed to send signal examples: {}", e);
                } else {
                    outbound::send_text(bot, chat_id, "Так выглядят сигналы, которые получают подписчики 👆").await?;
                }
            }
            show_payment_intro(bot, pool, chat_id, user_id).await
        }
    }
}

async fn show_payment_intro(bot: &Bot, pool: &DbPool, chat_id: i64, user_id: i64) -> BotResult<()> {
    let conn = db::get_connection(pool)?;
    db::set_user_state(&conn, user_id, Some(&UserState::PaymentIntro.encode()))?;
    drop(conn);

    let mut text = String::from("💰 <b>Тарифы PTT Signals</b>\n\n");
    for plan in PLANS {
        text.push_str(&format!("• {} — {} USDT\n", plan.name, plan.price_usdt));
    }
    text.push_str("\nВыберите тариф 👇");
    outbound::send_with_markup(bot, chat_id, &text, menu::plan_menu()).await?;
    Ok(())
}

async fn show_payment_methods(bot: &Bot, pool: &DbPool, chat_id: i64, user_id: i64, plan_key: &str) -> BotResult<()> {
    let plan = Plan::require(plan_key)?;

    let conn = db::get_connection(pool)?;
    let state = UserState::PaymentMethod { plan: plan.key.to_string() };
    db::set_user_state(&conn, user_id, Some(&state.encode()))?;
    drop(conn);

    let text = format!(
        "Тариф: <b>{}</b> — {} USDT\n\nКак вам удобнее оплатить?",
        plan.name, plan.price_usdt
    );
    outbound::send_with_markup(bot, chat_id, &text, menu::payment_method_menu()).await?;
    Ok(())
}

/// Moves the dialogue into "waiting for screenshot" and shows the payment
/// details for the chosen method. Requires a picked plan in the state.
async fn start_screenshot_wait(
    bot: &Bot,
    pool: &DbPool,
    chat_id: i64,
    user_id: i64,
    method: PaymentMethod,
    state: Option<UserState>,
) -> BotResult<()> {
    let plan_key = match state {
        Some(UserState::PaymentMethod { plan }) => plan,
        // Method re-pick while already waiting for a screenshot
        Some(UserState::WaitingScreenshot { plan, .. }) => plan,
        _ => {
            return show_payment_intro(bot, pool, chat_id, user_id).await;
        }
    };
    let plan = Plan::require(&plan_key)?;

    let conn = db::get_connection(pool)?;
    let state = UserState::WaitingScreenshot {
        method,
        plan: plan.key.to_string(),
    };
    db::set_user_state(&conn, user_id, Some(&state.encode()))?;
    drop(conn);

    match method {
        PaymentMethod::Crypto => {
            let text = format!(
                "💰 Оплата криптовалютой (USDT TRC20)\n\n\
                 Тариф: <b>{}</b> — {} USDT\n\n\
                 Адрес для перевода:\n<code>{}</code>\n\n\
                 После оплаты пришлите сюда скриншот перевода 📸",
                plan.name,
                plan.price_usdt,
                config::CRYPTO_ADDRESS.as_str()
            );
            outbound::send_with_markup(bot, chat_id, &text, menu::screenshot_menu()).await?;
        }
        PaymentMethod::Tribute => {
            let text = format!(
                "⚡ Оплата через Tribute\n\n\
                 Тариф: <b>{}</b> — {} USDT\n\n\
                 Оплатите по ссылке ниже, затем пришлите сюда скриншот оплаты 📸",
                plan.name, plan.price_usdt
            );
            if let Some(markup) = menu::tribute_link_button() {
                outbound::send_with_markup(bot, chat_id, &text, markup).await?;
            } else {
                let text = format!("{}\n\n{}", text, config::TRIBUTE_LINK.as_str());
                outbound::send_html(bot, chat_id, &text).await?;
            }
            outbound::send_with_markup(bot, chat_id, "Когда оплатите — жмите «📸 Отправить скрин»", menu::screenshot_menu())
                .await?;
        }
    }
    Ok(())
}

/// Payment proof received: record it, notify the admins for manual review.
async fn handle_screenshot(
    bot: &Bot,
    pool: &DbPool,
    msg: &Message,
    user_id: i64,
    method: PaymentMethod,
    plan_key: &str,
) -> BotResult<()> {
    let chat_id = msg.chat.id.0;
    let Some(photos) = msg.photo() else {
        return Ok(());
    };
    // Telegram sends several sizes; the last one is the original
    let Some(photo) = photos.last() else {
        return Ok(());
    };
    let file_id = photo.file.id.0.clone();
    let now = Utc::now();

    let conn = db::get_connection(pool)?;
    let payment_id = subscription::submit_proof(
        &conn,
        user_id,
        &ProofRef::Screenshot(file_id),
        method,
        plan_key,
        now,
    )?;
    db::set_user_state(&conn, user_id, None)?;
    let username = db::get_user(&conn, user_id)?.and_then(|u| u.username);
    drop(conn);

    log::info!(
        "Payment #{} submitted by {} ({} / {})",
        payment_id,
        user_id,
        method.as_str(),
        plan_key
    );

    outbound::send_with_markup(
        bot,
        chat_id,
        "✅ Скриншот получен!\n\nМы проверим оплату и активируем подписку. Обычно это занимает не больше пары часов.",
        menu::main_menu(),
    )
    .await?;

    // Review notification: screenshot + one-tap confirm for each admin
    let note = format!(
        "💳 Новая оплата на проверку\n\nПользователь: @{} (id={})\nТариф: {}\nМетод: {}\n\n/confirm {}",
        username.as_deref().unwrap_or("-"),
        user_id,
        plan_key,
        method.display_name(),
        user_id
    );
    for admin_id in config::admin::ADMIN_IDS.iter() {
        outbound::try_forward(bot, *admin_id, chat_id, msg.id).await;
        if let Err(e) = outbound::send_with_markup(bot, *admin_id, &note, menu::confirm_button(user_id)).await {
            log::warn!("Failed to notify admin {}: {}", admin_id, e);
        }
    }

    // The proof itself also lands in the audit channel
    if *config::LOG_CHANNEL_ID != 0 {
        outbound::try_forward(bot, *config::LOG_CHANNEL_ID, chat_id, msg.id).await;
    }
    outbound::audit(
        bot,
        &format!(
            "💳 [NEW PAYMENT] #{} user=@{} (id={}) plan={} method={}",
            payment_id,
            username.as_deref().unwrap_or("-"),
            user_id,
            plan_key,
            method.as_str()
        ),
    )
    .await;

    Ok(())
}

async fn handle_back(bot: &Bot, pool: &DbPool, chat_id: i64, user_id: i64, state: Option<UserState>) -> BotResult<()> {
    match state.and_then(|s| s.back()) {
        Some(UserState::PaymentMethod { plan }) => show_payment_methods(bot, pool, chat_id, user_id, &plan).await,
        Some(UserState::PaymentIntro) => show_payment_intro(bot, pool, chat_id, user_id).await,
        Some(other) => {
            // Not reachable with the current back() table
            let conn = db::get_connection(pool)?;
            db::set_user_state(&conn, user_id, Some(&other.encode()))?;
            drop(conn);
            outbound::send_with_markup(bot, chat_id, "Главное меню 👇", menu::main_menu()).await?;
            Ok(())
        }
        None => {
            let conn = db::get_connection(pool)?;
            db::set_user_state(&conn, user_id, None)?;
            drop(conn);
            outbound::send_with_markup(bot, chat_id, "Главное меню 👇", menu::main_menu()).await?;
            Ok(())
        }
    }
}

async fn show_status(bot: &Bot, pool: &DbPool, chat_id: i64, user_id: i64) -> BotResult<()> {
    let conn = db::get_connection(pool)?;
    let now = Utc::now();
    let user = db::get_user(&conn, user_id)?.ok_or(BotError::UserNotFound(user_id))?;
    let status = subscription::compute_display_status(&conn, &user, now)?;
    drop(conn);

    let mut text = format!("ℹ️ <b>Мой статус</b>\n\nПодписка: {}", status.label());

    if let Some(plan) = Plan::from_key(&user.plan) {
        text.push_str(&format!("\nТариф: {}", plan.name));
    }
    match status {
        DisplayStatus::ActiveLifetime => text.push_str("\nДействует: бессрочно"),
        DisplayStatus::Active => {
            if let Some(end) = user.end_date.as_deref() {
                text.push_str(&format!("\nДействует до: {}", fmt_date(end)));
            }
        }
        DisplayStatus::Expired => {
            if let Some(end) = user.end_date.as_deref() {
                text.push_str(&format!("\nИстекла: {}", fmt_date(end)));
            }
            text.push_str("\n\nПродлить можно в разделе «💰 Оплата».");
        }
        DisplayStatus::Pending => {
            text.push_str("\n\nОплата на проверке — активируем в ближайшее время.");
        }
        DisplayStatus::Inactive => {
            text.push_str("\n\nОформить подписку можно в разделе «💰 Оплата».");
        }
    }

    outbound::send_with_markup(bot, chat_id, &text, menu::main_menu()).await?;
    Ok(())
}

async fn show_support(bot: &Bot, chat_id: i64) -> BotResult<()> {
    let text = format!(
        "🧾 <b>Поддержка</b>\n\nПо вопросам оплаты и подписки пишите: {}",
        config::SUPPORT_CONTACT.as_str()
    );
    outbound::send_html(bot, chat_id, &text).await?;
    Ok(())
}

async fn show_help(bot: &Bot, chat_id: i64) -> BotResult<()> {
    let text = format!(
        "🆘 <b>Помощь</b>\n\n\
         📈 Получать сигналы — проверка, подключены ли вы к рассылке\n\
         💰 Оплата — выбор тарифа и оплата подписки\n\
         ℹ️ Мой статус — срок действия вашей подписки\n\
         🧾 Поддержка — связь с менеджером\n\n\
         Команды: /start /status /help\n\
         Вопросы: {}",
        config::SUPPORT_CONTACT.as_str()
    );
    outbound::send_html(bot, chat_id, &text).await?;
    Ok(())
}

async fn handle_free_text(
    bot: &Bot,
    pool: &DbPool,
    chat_id: i64,
    user_id: i64,
    state: Option<UserState>,
    text: &str,
) -> BotResult<()> {
    match state {
        Some(UserState::WaitingBroadcast) => admin::run_broadcast(bot, pool, chat_id, user_id, text).await,
        Some(UserState::WaitingUserSearch) => admin::run_user_search(bot, pool, chat_id, user_id, text).await,
        Some(UserState::WaitingScreenshot { .. }) => {
            outbound::send_text(
                bot,
                chat_id,
                "Жду скриншот перевода — пришлите его как фото 📸 (или «↩️ Назад»)",
            )
            .await?;
            Ok(())
        }
        // Nothing is waiting for this text: drop it, commands and menu
        // labels were already tried
        _ => {
            log::debug!("Ignoring unmatched text from {}", user_id);
            Ok(())
        }
    }
}

/// Formats an RFC 3339 timestamp as a human date (dd.mm.yyyy).
pub fn fmt_date(rfc3339: &str) -> String {
    DateTime::parse_from_rfc3339(rfc3339)
        .map(|d| d.with_timezone(&Utc).format("%d.%m.%Y").to_string())
        .unwrap_or_else(|_| rfc3339.to_string())
}
