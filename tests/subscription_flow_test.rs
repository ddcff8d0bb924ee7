//! Integration tests for the subscription lifecycle
//!
//! Run with: cargo test --test subscription_flow_test
//!
//! Drives the full none → pending → active → expired path through a real
//! SQLite database, the way the handlers and the background sweep do.

mod common;

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;

use signalbot::core::BotError;
use signalbot::storage::db;
use signalbot::subscription::{self, PaymentMethod, ProofRef};
use signalbot::telegram::forwarder::recipients;

const ADMINS: &[i64] = &[1000, 1001];

#[test]
fn full_lifecycle_proof_confirm_sweep() {
    let (_dir, pool) = common::test_pool();
    let conn = pool.get().unwrap();
    let t0 = common::seed_user(&pool, 500, Some("trader"));

    // Submitting a screenshot makes the user pending and invisible to fan-out
    subscription::submit_proof(
        &conn,
        500,
        &ProofRef::Screenshot("proof-file-id".into()),
        PaymentMethod::Crypto,
        "1m",
        t0,
    )
    .unwrap();
    assert_eq!(db::get_user(&conn, 500).unwrap().unwrap().status, "pending");
    assert!(db::get_active_users(&conn, t0).unwrap().is_empty());

    // Admin confirms: window starts now, fan-out picks the user up
    let c = subscription::confirm(&conn, ADMINS, 1000, 500, t0).unwrap();
    assert_eq!(c.end_date, Some(t0 + Duration::days(30)));
    assert_eq!(db::get_active_users(&conn, t0 + Duration::days(29)).unwrap(), vec![500]);

    // Day 31: the sweep demotes, fan-out loses the user the same instant
    let t_late = t0 + Duration::days(31);
    let expired = subscription::sweep_expirations(&conn, t_late).unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].telegram_id, 500);
    assert!(db::get_active_users(&conn, t_late).unwrap().is_empty());
    assert_eq!(db::get_user(&conn, 500).unwrap().unwrap().status, "expired");
}

#[test]
fn unauthorized_confirm_mutates_nothing() {
    let (_dir, pool) = common::test_pool();
    let conn = pool.get().unwrap();
    let t0 = common::seed_user(&pool, 500, None);
    subscription::submit_proof(
        &conn,
        500,
        &ProofRef::Screenshot("f".into()),
        PaymentMethod::Tribute,
        "3m",
        t0,
    )
    .unwrap();

    let err = subscription::confirm(&conn, ADMINS, 500, 500, t0).unwrap_err();
    assert!(matches!(err, BotError::Unauthorized));

    // Nothing moved: still pending, payment still open
    let user = db::get_user(&conn, 500).unwrap().unwrap();
    assert_eq!(user.status, "pending");
    assert_eq!(user.start_date, None);
    assert!(db::get_latest_open_payment(&conn, 500).unwrap().is_some());
}

#[test]
fn double_submission_confirm_closes_both_payments() {
    let (_dir, pool) = common::test_pool();
    let conn = pool.get().unwrap();
    let t0 = common::seed_user(&pool, 500, Some("eager"));

    for file_id in ["first", "second"] {
        subscription::submit_proof(
            &conn,
            500,
            &ProofRef::Screenshot(file_id.into()),
            PaymentMethod::Crypto,
            "1m",
            t0,
        )
        .unwrap();
    }

    let c = subscription::confirm(&conn, ADMINS, 1001, 500, t0).unwrap();
    assert_eq!(c.payments_closed, 2);
    assert!(db::get_latest_open_payment(&conn, 500).unwrap().is_none());

    let rows = db::get_latest_payments(&conn, 10).unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.status == "confirmed"));
}

#[test]
fn reconfirm_resets_the_window() {
    let (_dir, pool) = common::test_pool();
    let conn = pool.get().unwrap();
    let t0 = common::seed_user(&pool, 500, None);
    db::set_user_status_and_plan(&conn, 500, "pending", "1m").unwrap();

    subscription::confirm(&conn, ADMINS, 1000, 500, t0).unwrap();

    // Ten days later the admin confirms a renewal: 30 fresh days from now
    let t_renew = t0 + Duration::days(10);
    let c = subscription::confirm(&conn, ADMINS, 1000, 500, t_renew).unwrap();
    assert_eq!(c.end_date, Some(t_renew + Duration::days(30)));

    let user = db::get_user(&conn, 500).unwrap().unwrap();
    assert_eq!(user.start_date, Some(t_renew.to_rfc3339()));
}

#[test]
fn lifetime_survives_every_sweep() {
    let (_dir, pool) = common::test_pool();
    let conn = pool.get().unwrap();
    let t0 = common::seed_user(&pool, 500, None);
    db::set_user_status_and_plan(&conn, 500, "pending", "lifetime").unwrap();
    subscription::confirm(&conn, ADMINS, 1000, 500, t0).unwrap();

    let far_future = t0 + Duration::days(3650);
    assert!(subscription::sweep_expirations(&conn, far_future).unwrap().is_empty());
    assert_eq!(db::get_active_users(&conn, far_future).unwrap(), vec![500]);
}

#[test]
fn expiry_reminders_target_exact_date() {
    let (_dir, pool) = common::test_pool();
    let conn = pool.get().unwrap();
    let t0 = common::seed_user(&pool, 500, Some("soon"));
    common::seed_user(&pool, 501, Some("later"));
    db::activate_user(&conn, 500, "1m", t0, Some(t0 + Duration::days(1))).unwrap();
    db::activate_user(&conn, 501, "1m", t0, Some(t0 + Duration::days(15))).unwrap();

    let tomorrow = (t0 + Duration::days(1)).date_naive();
    let expiring = db::get_users_expiring_on(&conn, tomorrow).unwrap();
    assert_eq!(expiring.len(), 1);
    assert_eq!(expiring[0].telegram_id, 500);
}

#[test]
fn fanout_set_is_active_union_admins() {
    let (_dir, pool) = common::test_pool();
    let conn = pool.get().unwrap();
    let t0 = common::seed_user(&pool, 500, None);
    db::set_user_status_and_plan(&conn, 500, "pending", "1m").unwrap();
    subscription::confirm(&conn, ADMINS, 1000, 500, t0).unwrap();

    // An admin who is also a subscriber appears once
    common::seed_user(&pool, 1000, Some("boss"));
    db::set_user_status_and_plan(&conn, 1000, "pending", "lifetime").unwrap();
    subscription::confirm(&conn, ADMINS, 1000, 1000, t0).unwrap();

    let active = db::get_active_users(&conn, t0).unwrap();
    let targets = recipients(&active, ADMINS);
    assert_eq!(targets, vec![500, 1000, 1001]);
}
