//! Core infrastructure: configuration, error taxonomy, logging.

pub mod config;
pub mod error;
pub mod logging;

pub use error::{BotError, BotResult};
pub use logging::init_logger;
