//! Integration tests for the storage layer
//!
//! Run with: cargo test --test storage_test

mod common;

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;

use signalbot::dialogue::UserState;
use signalbot::storage::db;
use signalbot::subscription::PaymentMethod;

#[test]
fn upsert_is_idempotent_and_tracks_last_seen() {
    let (_dir, pool) = common::test_pool();
    let conn = pool.get().unwrap();
    let t0 = Utc::now();

    assert!(db::upsert_user(&conn, 42, Some("old_name"), t0).unwrap());
    let t1 = t0 + Duration::minutes(5);
    assert!(!db::upsert_user(&conn, 42, Some("new_name"), t1).unwrap());

    let user = db::get_user(&conn, 42).unwrap().unwrap();
    assert_eq!(user.username.as_deref(), Some("new_name"));
    assert_eq!(user.joined_at, t0.to_rfc3339());
    assert_eq!(user.last_seen, Some(t1.to_rfc3339()));
}

#[test]
fn dialogue_state_round_trips_through_db() {
    let (_dir, pool) = common::test_pool();
    let conn = pool.get().unwrap();
    common::seed_user(&pool, 42, None);

    let state = UserState::WaitingScreenshot {
        method: PaymentMethod::Tribute,
        plan: "3m".into(),
    };
    db::set_user_state(&conn, 42, Some(&state.encode())).unwrap();

    let stored = db::get_user_state(&conn, 42).unwrap().unwrap();
    assert_eq!(UserState::parse(&stored), Some(state));

    db::set_user_state(&conn, 42, None).unwrap();
    assert_eq!(db::get_user_state(&conn, 42).unwrap(), None);
}

#[test]
fn active_users_query_handles_null_end_date() {
    let (_dir, pool) = common::test_pool();
    let conn = pool.get().unwrap();
    let now = Utc::now();

    common::seed_user(&pool, 1, None);
    db::activate_user(&conn, 1, "lifetime", now, None).unwrap();
    common::seed_user(&pool, 2, None);
    db::activate_user(&conn, 2, "1m", now, Some(now + Duration::days(30))).unwrap();
    common::seed_user(&pool, 3, None);
    db::activate_user(&conn, 3, "1m", now - Duration::days(60), Some(now - Duration::days(30))).unwrap();

    let mut active = db::get_active_users(&conn, now).unwrap();
    active.sort_unstable();
    // User 3 is stale-active: filtered from fan-out even before the sweep
    assert_eq!(active, vec![1, 2]);
}

#[test]
fn payment_report_joins_usernames() {
    let (_dir, pool) = common::test_pool();
    let conn = pool.get().unwrap();
    let now = Utc::now();
    common::seed_user(&pool, 7, Some("payer"));

    db::add_payment(&conn, 7, None, Some("shot1"), "pending", "crypto", Some("1m"), now).unwrap();
    db::add_payment(&conn, 7, Some("0xabc"), None, "confirmed", "tribute", Some("3m"), now + Duration::seconds(1))
        .unwrap();

    let rows = db::get_latest_payments(&conn, 10).unwrap();
    assert_eq!(rows.len(), 2);
    // Newest first
    assert_eq!(rows[0].txid.as_deref(), Some("0xabc"));
    assert_eq!(rows[0].username.as_deref(), Some("payer"));
    assert_eq!(rows[1].plan.as_deref(), Some("1m"));
}

#[test]
fn open_payment_updates_in_place() {
    let (_dir, pool) = common::test_pool();
    let conn = pool.get().unwrap();
    let now = Utc::now();
    common::seed_user(&pool, 7, None);
    db::add_payment(&conn, 7, None, Some("shot"), "pending", "crypto", None, now).unwrap();

    assert!(db::update_latest_open_payment(&conn, 7, Some("0xdef"), None, Some("1m")).unwrap());

    let payment = db::get_latest_open_payment(&conn, 7).unwrap().unwrap();
    assert_eq!(payment.txid.as_deref(), Some("0xdef"));
    assert_eq!(payment.plan.as_deref(), Some("1m"));
    // COALESCE keeps fields that were not supplied
    assert_eq!(payment.payment_method, "crypto");
    assert_eq!(payment.screenshot_file_id.as_deref(), Some("shot"));
}

#[test]
fn daily_stats_count_per_calendar_day() {
    let (_dir, pool) = common::test_pool();
    let conn = pool.get().unwrap();
    let now = Utc::now();

    common::seed_user(&pool, 1, None);
    common::seed_user(&pool, 2, None);
    db::add_payment(&conn, 1, None, Some("s"), "pending", "crypto", Some("1m"), now).unwrap();

    let today = db::get_daily_stats(&conn, now.date_naive()).unwrap();
    assert_eq!(today.new_users, 2);
    assert_eq!(today.new_payments, 1);

    let yesterday = db::get_daily_stats(&conn, now.date_naive() - Duration::days(1)).unwrap();
    assert_eq!(yesterday.new_users, 0);
    assert_eq!(yesterday.new_payments, 0);
}

#[test]
fn database_stats_aggregate_by_group() {
    let (_dir, pool) = common::test_pool();
    let conn = pool.get().unwrap();
    let now = Utc::now();

    common::seed_user(&pool, 1, None);
    common::seed_user(&pool, 2, None);
    db::activate_user(&conn, 1, "1m", now, Some(now + Duration::days(30))).unwrap();

    let stats = db::get_database_stats(&conn).unwrap();
    assert_eq!(stats.total_users, 2);
    assert_eq!(stats.active_users, 1);
    assert!(stats.users_by_status.contains(&("active".to_string(), 1)));
    assert!(stats.users_by_status.contains(&("none".to_string(), 1)));
}
