//! Common test utilities
//!
//! Shared across integration tests: every test gets its own temporary
//! SQLite database, so tests are independent and need no serialization.

use chrono::{DateTime, Utc};
use signalbot::storage::db::{self, DbPool};
use signalbot::storage::create_pool;
use tempfile::TempDir;

/// Creates a pooled connection to a fresh database in a temp dir.
/// Keep the TempDir alive for the duration of the test.
pub fn test_pool() -> (TempDir, DbPool) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("test.db");
    let pool = create_pool(path.to_str().expect("utf-8 path")).expect("create pool");
    (dir, pool)
}

/// Registers a user and returns the timestamp used.
pub fn seed_user(pool: &DbPool, telegram_id: i64, username: Option<&str>) -> DateTime<Utc> {
    let now = Utc::now();
    let conn = pool.get().expect("get connection");
    db::upsert_user(&conn, telegram_id, username, now).expect("upsert user");
    now
}
