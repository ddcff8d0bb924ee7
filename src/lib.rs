//! signalbot — subscription-gated forwarding of trading signals from a
//! private Telegram channel to paying subscribers.
//!
//! The crate is organized in layers:
//! - `core` — configuration, error taxonomy, logging
//! - `storage` — SQLite persistence and database backups
//! - `subscription` — plan catalog and the subscription state machine
//! - `dialogue` — persisted conversational state
//! - `telegram` — update dispatch, handlers, forwarder, admin surface
//! - `tasks` — daily expiry sweep and backup/report schedulers

pub mod core;
pub mod dialogue;
pub mod storage;
pub mod subscription;
pub mod tasks;
pub mod telegram;
