//! Conversational state tracker.
//!
//! The bot is menu-driven, so between messages we must remember what a user
//! is in the middle of (picking a plan, sending a screenshot, typing a
//! broadcast). State is persisted as an opaque token in `users.user_state`
//! and survives restarts; this module owns the token encoding and the "Назад"
//! (back) transition table.

use crate::subscription::PaymentMethod;

/// What the bot is currently waiting for from a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserState {
    /// Plan selection screen is open
    PaymentIntro,
    /// Plan picked, choosing a payment method
    PaymentMethod { plan: String },
    /// Method picked, next message should be a payment screenshot
    WaitingScreenshot { method: PaymentMethod, plan: String },
    /// Admin: next message is the broadcast text
    WaitingBroadcast,
    /// Admin: next message is a user search query
    WaitingUserSearch,
}

impl UserState {
    /// Encodes the state into its persisted token.
    pub fn encode(&self) -> String {
        match self {
            UserState::PaymentIntro => "payment_intro".to_string(),
            UserState::PaymentMethod { plan } => format!("payment_method_{}", plan),
            UserState::WaitingScreenshot { method, plan } => {
                format!("waiting_screenshot_{}_{}", method.as_str(), plan)
            }
            UserState::WaitingBroadcast => "waiting_broadcast".to_string(),
            UserState::WaitingUserSearch => "waiting_user_search".to_string(),
        }
    }

    /// Decodes a persisted token. Unknown tokens decode to None, which the
    /// dispatcher treats the same as "no pending dialogue" — a forward
    /// compatible reset rather than an error.
    pub fn parse(token: &str) -> Option<UserState> {
        match token {
            "payment_intro" => return Some(UserState::PaymentIntro),
            "waiting_broadcast" => return Some(UserState::WaitingBroadcast),
            "waiting_user_search" => return Some(UserState::WaitingUserSearch),
            _ => {}
        }

        if let Some(plan) = token.strip_prefix("payment_method_") {
            if !plan.is_empty() {
                return Some(UserState::PaymentMethod { plan: plan.to_string() });
            }
        }

        if let Some(rest) = token.strip_prefix("waiting_screenshot_") {
            // Token layout: waiting_screenshot_<method>_<plan>
            let (method_str, plan) = rest.split_once('_')?;
            let method = PaymentMethod::parse(method_str)?;
            if plan.is_empty() {
                return None;
            }
            return Some(UserState::WaitingScreenshot {
                method,
                plan: plan.to_string(),
            });
        }

        None
    }

    /// Where "↩️ Назад" leads from this state. None = back to the main menu
    /// with the dialogue cleared.
    pub fn back(&self) -> Option<UserState> {
        match self {
            UserState::WaitingScreenshot { plan, .. } => Some(UserState::PaymentMethod { plan: plan.clone() }),
            UserState::PaymentMethod { .. } => Some(UserState::PaymentIntro),
            UserState::PaymentIntro => None,
            // Admin prompts are single-level: back always cancels them
            UserState::WaitingBroadcast | UserState::WaitingUserSearch => None,
        }
    }
}
