//! Integration tests for environment configuration
//!
//! Run with: cargo test --test config_test
//!
//! Config statics are lazy and read the environment exactly once, so each
//! value is exercised by a single test and the tests are serialized: env
//! mutation is process-global.

use serial_test::serial;

use signalbot::core::config;

#[test]
#[serial]
fn admin_ids_parse_comma_separated_with_noise() {
    std::env::set_var("ADMIN_IDS", " 100, 200,abc, 300 ");
    let ids: &Vec<i64> = &config::admin::ADMIN_IDS;
    assert_eq!(ids, &vec![100, 200, 300]);
}

#[test]
#[serial]
fn database_path_falls_back_to_default() {
    std::env::remove_var("DATABASE_PATH");
    assert_eq!(config::DATABASE_PATH.as_str(), "data/users.db");
}

#[test]
#[serial]
fn unset_channel_ids_default_to_zero() {
    std::env::remove_var("SIGNAL_CHANNEL_ID");
    std::env::remove_var("LOG_CHANNEL_ID");
    assert_eq!(*config::SIGNAL_CHANNEL_ID, 0);
    assert_eq!(*config::LOG_CHANNEL_ID, 0);
}

#[test]
fn poll_and_network_timeouts_are_ordered() {
    // getUpdates must time out server-side before the HTTP client gives up
    assert!(config::network::TIMEOUT_SECS > config::poll::TIMEOUT_SECS as u64);
}
