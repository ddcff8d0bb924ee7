use thiserror::Error;

/// Domain error taxonomy.
///
/// Transport errors are split into transient (swallowed, the loop simply
/// tries again next cycle) and rejected (logged once, the operation is
/// abandoned). Authorization and input errors are surfaced to the caller
/// as visible replies, never escalated.
#[derive(Debug, Error)]
pub enum BotError {
    /// Timeout, rate limit or network hiccup — safe to ignore and retry
    /// on the next cycle.
    #[error("transient transport error: {0}")]
    TransportTransient(String),

    /// The API rejected the request (unknown recipient, blocked bot, …).
    /// Logged once, no retry.
    #[error("transport rejected request: {0}")]
    TransportRejected(String),

    /// Caller is not in the administrator set.
    #[error("unauthorized")]
    Unauthorized,

    /// Unknown plan key.
    #[error("unknown plan: {0}")]
    InvalidPlan(String),

    /// Target user has not picked a plan yet, nothing to confirm.
    #[error("user {0} has no plan selected")]
    NoPlanSelected(i64),

    /// Target user does not exist in the database.
    #[error("user {0} not found")]
    UserNotFound(i64),

    #[error("database error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

impl From<teloxide::RequestError> for BotError {
    fn from(e: teloxide::RequestError) -> Self {
        use teloxide::RequestError as E;
        match &e {
            E::Network(_) | E::Io(_) | E::RetryAfter(_) | E::InvalidJson { .. } => {
                BotError::TransportTransient(e.to_string())
            }
            _ => BotError::TransportRejected(e.to_string()),
        }
    }
}

pub type BotResult<T> = Result<T, BotError>;
