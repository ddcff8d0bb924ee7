use once_cell::sync::Lazy;
use std::env;

/// Configuration constants for the bot
///
/// Everything is read once at startup from environment variables
/// (loaded from `.env` by `dotenvy` in `main`).

/// Telegram bot token
/// Read from BOT_TOKEN environment variable
pub static BOT_TOKEN: Lazy<String> = Lazy::new(|| env::var("BOT_TOKEN").unwrap_or_else(|_| String::new()));

/// Path to the SQLite database file
pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| env::var("DATABASE_PATH").unwrap_or_else(|_| "data/users.db".to_string()));

/// Path to the log file
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "signalbot.log".to_string()));

/// ID of the private channel signals are forwarded FROM
/// Read from SIGNAL_CHANNEL_ID environment variable (e.g. -1003136921053)
pub static SIGNAL_CHANNEL_ID: Lazy<i64> = Lazy::new(|| {
    env::var("SIGNAL_CHANNEL_ID")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
});

/// ID of the audit/log channel every lifecycle event is mirrored to
/// Read from LOG_CHANNEL_ID environment variable
pub static LOG_CHANNEL_ID: Lazy<i64> = Lazy::new(|| {
    env::var("LOG_CHANNEL_ID")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
});

/// TRC20 USDT address shown to users paying with crypto
pub static CRYPTO_ADDRESS: Lazy<String> =
    Lazy::new(|| env::var("CRYPTO_ADDRESS").unwrap_or_else(|_| String::new()));

/// Link to the Tribute mini app for the alternate payment method
pub static TRIBUTE_LINK: Lazy<String> =
    Lazy::new(|| env::var("TRIBUTE_LINK").unwrap_or_else(|_| "https://t.me/tribute/app".to_string()));

/// Support contact shown in help/support screens (t.me username, with @)
pub static SUPPORT_CONTACT: Lazy<String> =
    Lazy::new(|| env::var("SUPPORT_CONTACT").unwrap_or_else(|_| "@PTTmanager".to_string()));

/// Telegram file ids of example signal photos, shown to users who are not
/// subscribed yet (comma-separated). Empty = no album.
pub static SIGNAL_EXAMPLES: Lazy<Vec<String>> = Lazy::new(|| {
    env::var("SIGNAL_EXAMPLES")
        .unwrap_or_else(|_| String::new())
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
});

/// Admin configuration
pub mod admin {
    use once_cell::sync::Lazy;
    use std::env;

    /// List of administrator Telegram IDs (comma-separated)
    /// Read from ADMIN_IDS environment variable
    pub static ADMIN_IDS: Lazy<Vec<i64>> = Lazy::new(|| {
        env::var("ADMIN_IDS")
            .unwrap_or_else(|_| String::new())
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect()
    });
}

/// Long-poll configuration
pub mod poll {
    use std::time::Duration;

    /// Server-side long-poll timeout for getUpdates (in seconds)
    pub const TIMEOUT_SECS: u32 = 30;

    /// Pause after a transient transport error before the next poll
    pub const ERROR_BACKOFF_SECS: u64 = 3;

    /// Error backoff duration
    pub fn error_backoff() -> Duration {
        Duration::from_secs(ERROR_BACKOFF_SECS)
    }
}

/// Channel forwarder configuration
pub mod forwarder {
    use std::time::Duration;

    /// Minimum interval between fan-out passes (in seconds)
    pub const INTERVAL_SECS: u64 = 10;

    /// Pause between per-recipient sends to stay under the API rate limit
    pub const PER_RECIPIENT_DELAY_MS: u64 = 50;

    /// Fan-out cadence duration
    pub fn interval() -> Duration {
        Duration::from_secs(INTERVAL_SECS)
    }

    /// Per-recipient send delay
    pub fn per_recipient_delay() -> Duration {
        Duration::from_millis(PER_RECIPIENT_DELAY_MS)
    }
}

/// Broadcast configuration
pub mod broadcast {
    use std::time::Duration;

    /// Pause between per-recipient sends during an admin broadcast
    pub const PER_RECIPIENT_DELAY_MS: u64 = 100;

    pub fn per_recipient_delay() -> Duration {
        Duration::from_millis(PER_RECIPIENT_DELAY_MS)
    }
}

/// Expiry sweep configuration
pub mod sweep {
    use std::time::Duration;

    /// Normal cadence of the expiry sweep (once per day)
    pub const INTERVAL_SECS: u64 = 86_400;

    /// Shorter retry cadence after a failed sweep run
    pub const RETRY_SECS: u64 = 3_600;

    pub fn interval() -> Duration {
        Duration::from_secs(INTERVAL_SECS)
    }

    pub fn retry_interval() -> Duration {
        Duration::from_secs(RETRY_SECS)
    }
}

/// Backup / daily report configuration
pub mod backup {
    use std::time::Duration;

    /// How often the backup task wakes up to check the date guard
    pub const CHECK_INTERVAL_SECS: u64 = 3_600;

    /// Snapshots older than this many days are pruned
    pub const RETENTION_DAYS: i64 = 30;

    pub fn check_interval() -> Duration {
        Duration::from_secs(CHECK_INTERVAL_SECS)
    }
}

/// Network configuration
pub mod network {
    use std::time::Duration;

    /// Timeout for outbound Bot API calls (in seconds)
    ///
    /// Must stay above the long-poll TIMEOUT_SECS or every getUpdates
    /// call would time out client-side first.
    pub const TIMEOUT_SECS: u64 = 40;

    pub fn timeout() -> Duration {
        Duration::from_secs(TIMEOUT_SECS)
    }
}
