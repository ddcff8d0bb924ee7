//! Telegram integration: update dispatch, user and admin handlers, the
//! signal forwarder and outbound delivery helpers.

pub mod admin;
pub mod commands;
pub mod dispatcher;
pub mod forwarder;
pub mod handlers;
pub mod menu;
pub mod outbound;
