//! Reply keyboards and button labels.
//!
//! Labels double as routing keys: `commands::classify` matches incoming text
//! against these exact strings, so every label lives here as a named constant
//! and nowhere else.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup};

use crate::core::config;
use crate::subscription::{Plan, PLANS};

pub const BTN_GET_SIGNALS: &str = "📈 Получать сигналы";
pub const BTN_PAY: &str = "💰 Оплата";
pub const BTN_MY_STATUS: &str = "ℹ️ Мой статус";
pub const BTN_SUPPORT: &str = "🧾 Поддержка";
pub const BTN_HELP: &str = "🆘 Помощь";
pub const BTN_BACK: &str = "↩️ Назад";
pub const BTN_PAY_CRYPTO: &str = "💰 Оплатить криптой (TRC20)";
pub const BTN_PAY_TRIBUTE: &str = "⚡ Оплатить через Tribute";
pub const BTN_SEND_SCREENSHOT: &str = "📸 Отправить скрин";

/// Main menu shown after /start and whenever a dialogue ends.
pub fn main_menu() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(BTN_GET_SIGNALS), KeyboardButton::new(BTN_PAY)],
        vec![KeyboardButton::new(BTN_MY_STATUS), KeyboardButton::new(BTN_SUPPORT)],
        vec![KeyboardButton::new(BTN_HELP)],
    ])
    .resize_keyboard()
}

/// Plan selection: one row per plan plus a back row.
pub fn plan_menu() -> KeyboardMarkup {
    let mut rows: Vec<Vec<KeyboardButton>> = PLANS
        .iter()
        .map(|p| vec![KeyboardButton::new(p.menu_label())])
        .collect();
    rows.push(vec![KeyboardButton::new(BTN_BACK)]);
    KeyboardMarkup::new(rows).resize_keyboard()
}

/// Payment method selection for a picked plan.
pub fn payment_method_menu() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(BTN_PAY_CRYPTO)],
        vec![KeyboardButton::new(BTN_PAY_TRIBUTE)],
        vec![KeyboardButton::new(BTN_BACK)],
    ])
    .resize_keyboard()
}

/// Shown while the bot waits for a payment screenshot.
pub fn screenshot_menu() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(BTN_SEND_SCREENSHOT)],
        vec![KeyboardButton::new(BTN_BACK)],
    ])
    .resize_keyboard()
}

/// Matches a message text against the plan labels ("1 месяц — 39 USDT").
pub fn plan_by_label(text: &str) -> Option<&'static Plan> {
    PLANS.iter().find(|p| p.menu_label() == text)
}

/// Inline admin panel (/admin).
pub fn admin_panel() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("👥 Пользователи", "admin_users"),
            InlineKeyboardButton::callback("💳 Платежи", "admin_payments"),
        ],
        vec![
            InlineKeyboardButton::callback("📊 Статистика", "admin_stats"),
            InlineKeyboardButton::callback("📣 Рассылка", "admin_broadcast"),
        ],
        vec![InlineKeyboardButton::callback("🔍 Поиск пользователя", "admin_search")],
    ])
}

/// Single "back to panel" row under admin sub-screens.
pub fn admin_back() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "↩️ К панели",
        "back_admin_panel",
    )]])
}

/// Inline confirm button attached to a payment review notification.
pub fn confirm_button(user_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "✅ Подтвердить оплату",
        format!("confirm_{}", user_id),
    )]])
}

/// Inline link to the Tribute mini app.
pub fn tribute_link_button() -> Option<InlineKeyboardMarkup> {
    let link = config::TRIBUTE_LINK.clone();
    let url = url::Url::parse(&link).ok()?;
    Some(InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::url(
        "⚡ Открыть Tribute",
        url,
    )]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn plan_labels_route_back_to_plans() {
        for plan in PLANS {
            let found = plan_by_label(&plan.menu_label()).unwrap();
            assert_eq!(found.key, plan.key);
        }
        assert!(plan_by_label("1 месяц").is_none());
        assert!(plan_by_label(BTN_BACK).is_none());
    }

    #[test]
    fn plan_menu_lists_every_plan_plus_back() {
        let menu = plan_menu();
        assert_eq!(menu.keyboard.len(), PLANS.len() + 1);
    }
}
