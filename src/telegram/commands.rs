//! Incoming text classification.
//!
//! One pure function turns a message text into a closed routing enum, so the
//! precedence rules (slash commands beat menu buttons beat dialogue state)
//! are testable without constructing Telegram update objects.

use crate::telegram::menu;

/// Slash commands. Admin-only ones still classify for everybody; the
/// authorization check happens at execution time in `admin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Status,
    Help,
    Users,
    /// /confirm <telegram_id>; None when the argument is missing or not a number
    Confirm(Option<i64>),
    Payments,
    /// /broadcast [text]; None starts the two-step prompt flow
    Broadcast(Option<String>),
    Stats,
    AdminPanel,
    TestLog,
    TestForward,
    TestDb,
}

/// Reply-keyboard buttons from `menu`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuButton {
    GetSignals,
    Pay,
    MyStatus,
    Support,
    Help,
    Back,
    /// One of the plan rows; carries the stable plan key
    PlanPick(&'static str),
    PayCrypto,
    PayTribute,
    SendScreenshot,
}

/// Classification result, in dispatch priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Command(Command),
    Button(MenuButton),
    /// Anything else: meaningful only when a dialogue state is waiting for it
    Text(String),
}

/// Classifies a message text. Priority: slash command, then exact menu
/// button label, then free text.
pub fn classify(text: &str) -> Incoming {
    let trimmed = text.trim();

    if let Some(cmd) = parse_command(trimmed) {
        return Incoming::Command(cmd);
    }
    if let Some(btn) = parse_button(trimmed) {
        return Incoming::Button(btn);
    }
    Incoming::Text(trimmed.to_string())
}

fn parse_command(text: &str) -> Option<Command> {
    if !text.starts_with('/') {
        return None;
    }
    let mut parts = text.splitn(2, char::is_whitespace);
    let head = parts.next()?;
    let rest = parts.next().map(str::trim).filter(|s| !s.is_empty());

    // "/start@SignalBot" addresses this bot in a group; strip the suffix
    let name = head.split('@').next().unwrap_or(head);

    match name {
        "/start" => Some(Command::Start),
        "/status" => Some(Command::Status),
        "/help" => Some(Command::Help),
        "/users" => Some(Command::Users),
        "/confirm" => Some(Command::Confirm(rest.and_then(|s| s.parse().ok()))),
        "/payments" => Some(Command::Payments),
        "/broadcast" => Some(Command::Broadcast(rest.map(str::to_string))),
        "/stats" => Some(Command::Stats),
        "/admin" => Some(Command::AdminPanel),
        "/test_log" => Some(Command::TestLog),
        "/test_forward" => Some(Command::TestForward),
        "/test_db" => Some(Command::TestDb),
        _ => None,
    }
}

fn parse_button(text: &str) -> Option<MenuButton> {
    match text {
        menu::BTN_GET_SIGNALS => return Some(MenuButton::GetSignals),
        menu::BTN_PAY => return Some(MenuButton::Pay),
        menu::BTN_MY_STATUS => return Some(MenuButton::MyStatus),
        menu::BTN_SUPPORT => return Some(MenuButton::Support),
        menu::BTN_HELP => return Some(MenuButton::Help),
        menu::BTN_BACK => return Some(MenuButton::Back),
        menu::BTN_PAY_CRYPTO => return Some(MenuButton::PayCrypto),
        menu::BTN_PAY_TRIBUTE => return Some(MenuButton::PayTribute),
        menu::BTN_SEND_SCREENSHOT => return Some(MenuButton::SendScreenshot),
        _ => {}
    }
    menu::plan_by_label(text).map(|p| MenuButton::PlanPick(p.key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn commands_beat_everything() {
        assert_eq!(classify("/start"), Incoming::Command(Command::Start));
        assert_eq!(classify("  /status  "), Incoming::Command(Command::Status));
        assert_eq!(classify("/start@SignalBot"), Incoming::Command(Command::Start));
    }

    #[test]
    fn confirm_parses_target_id() {
        assert_eq!(classify("/confirm 12345"), Incoming::Command(Command::Confirm(Some(12345))));
        assert_eq!(classify("/confirm"), Incoming::Command(Command::Confirm(None)));
        assert_eq!(classify("/confirm bob"), Incoming::Command(Command::Confirm(None)));
    }

    #[test]
    fn broadcast_keeps_inline_text() {
        assert_eq!(
            classify("/broadcast Всем привет"),
            Incoming::Command(Command::Broadcast(Some("Всем привет".into())))
        );
        assert_eq!(classify("/broadcast"), Incoming::Command(Command::Broadcast(None)));
    }

    #[test]
    fn menu_buttons_route_by_exact_label() {
        assert_eq!(classify("💰 Оплата"), Incoming::Button(MenuButton::Pay));
        assert_eq!(classify("↩️ Назад"), Incoming::Button(MenuButton::Back));
        assert_eq!(
            classify("1 месяц — 39 USDT"),
            Incoming::Button(MenuButton::PlanPick("1m"))
        );
        assert_eq!(
            classify("Пожизненно — 239 USDT"),
            Incoming::Button(MenuButton::PlanPick("lifetime"))
        );
    }

    #[test]
    fn debug_commands_use_underscores() {
        assert_eq!(classify("/test_log"), Incoming::Command(Command::TestLog));
        assert_eq!(classify("/test_forward"), Incoming::Command(Command::TestForward));
        assert_eq!(classify("/test_db"), Incoming::Command(Command::TestDb));
    }

    #[test]
    fn unknown_slash_falls_through_to_text() {
        assert_eq!(classify("/dance"), Incoming::Text("/dance".into()));
    }

    #[test]
    fn plain_text_falls_through() {
        assert_eq!(classify("когда сигналы?"), Incoming::Text("когда сигналы?".into()));
    }
}
