use super::*;
use crate::store::test_support::write_item_table;
use std::fs;
use tempfile::{TempDir, tempdir};

struct Fixture {
    _root: TempDir,
    state: PathBuf,
    logs: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let root = tempdir().unwrap();
        let state = root.path().join("globalStorage");
        let logs = root.path().join("logs");
        fs::create_dir_all(&state).unwrap();
        fs::create_dir_all(&logs).unwrap();
        Self {
            _root: root,
            state,
            logs,
        }
    }

    fn monitor(&self) -> TokenMonitor {
        TokenMonitor::new(
            vec![self.state.clone()],
            LogScanner::new(vec![self.logs.clone()], 5, 1000),
            Duration::from_secs(60),
        )
    }

    fn write_storage(&self, json: &str) {
        fs::write(self.state.join(STORAGE_FILE), json).unwrap();
    }
}

#[test]
fn test_empty_access_token_in_storage_is_expired() {
    let fx = Fixture::new();
    fx.write_storage(r#"{"cursorAuth/accessToken": ""}"#);

    let status = fx.monitor().check_token_status(false, Duration::ZERO);
    assert!(status.expired);
    let reason = status.reason.unwrap();
    assert!(reason.contains("cursorAuth/accessToken"), "reason: {reason}");
    assert!(status.tokens_found.storage["cursorAuth/accessToken"].is_empty);
    assert!(status.errors.is_empty());
}

#[test]
fn test_no_signals_is_not_expired() {
    let fx = Fixture::new();
    fx.write_storage(r#"{"cursorAuth/accessToken": "eyJhbGciOi"}"#);

    let status = fx.monitor().check_token_status(false, Duration::ZERO);
    assert!(!status.expired);
    assert!(status.reason.is_none());
    assert_eq!(status.tokens_found.storage["cursorAuth/accessToken"].value_length, 10);
    assert_eq!(status.sources_checked.len(), 3);
}

#[test]
fn test_missing_directories_are_not_errors() {
    let root = tempdir().unwrap();
    let mut monitor = TokenMonitor::new(
        vec![root.path().join("nope")],
        LogScanner::new(vec![root.path().join("nolog")], 5, 1000),
        Duration::from_secs(60),
    );
    let status = monitor.check_token_status(false, Duration::ZERO);
    assert!(!status.expired);
    assert!(status.errors.is_empty());
    assert!(status.sources_checked.contains(SOURCE_LOGS));
}

#[test]
fn test_empty_database_row_is_expired() {
    let fx = Fixture::new();
    write_item_table(
        &fx.state.join(DATABASE_FILE),
        &[("augmentcode.sessions", Some("")), ("other.key", Some("x"))],
    );

    let status = fx.monitor().check_token_status(false, Duration::ZERO);
    assert!(status.expired);
    assert_eq!(
        status.reason.as_deref(),
        Some("Token record augmentcode.sessions is empty in database")
    );
    assert_eq!(status.tokens_found.database["%augment%"], 1);
}

#[test]
fn test_log_error_line_is_expired() {
    let fx = Fixture::new();
    fs::write(
        fx.logs.join("renderer.log"),
        "2024-01-01 10:00:00 info boot\n2024-01-01 10:00:05 error Token Expired for user\n",
    )
    .unwrap();

    let status = fx.monitor().check_token_status(false, Duration::ZERO);
    assert!(status.expired);
    assert_eq!(status.tokens_found.logs.len(), 1);
    assert_eq!(status.tokens_found.logs[0].pattern, r"token\s+expired");
    assert!(status.reason.unwrap().starts_with("Token error found in logs"));
}

#[test]
fn test_first_reason_wins_but_all_sources_run() {
    let fx = Fixture::new();
    fx.write_storage(r#"{"workos.accessToken": null}"#);
    write_item_table(&fx.state.join(DATABASE_FILE), &[("cursorAuth/accessToken", None)]);
    fs::write(fx.logs.join("main.log"), "401 Unauthorized\n").unwrap();

    let status = fx.monitor().check_token_status(false, Duration::ZERO);
    assert!(status.expired);
    assert_eq!(
        status.reason.as_deref(),
        Some("Token workos.accessToken is empty in storage.json")
    );
    assert!(!status.tokens_found.database.is_empty(), "database source still ran");
    assert_eq!(status.tokens_found.logs.len(), 1, "log source still ran");
}

#[test]
fn test_malformed_storage_recorded_and_other_sources_continue() {
    let fx = Fixture::new();
    fx.write_storage("{not json");
    fs::write(fx.logs.join("main.log"), "authentication failed\n").unwrap();

    let status = fx.monitor().check_token_status(false, Duration::ZERO);
    assert_eq!(status.errors.len(), 1);
    assert!(status.errors[0].contains("JSON decode error"));
    assert!(status.expired, "log source still flags expiration");
}

#[test]
fn test_subscription_expiry_in_milliseconds() {
    let fx = Fixture::new();
    // 2020-09-13T12:26:40Z in milliseconds.
    fx.write_storage(r#"{"cursorAuth/trialExpiration": 1600000000000}"#);

    let status = fx.monitor().check_token_status(false, Duration::ZERO);
    assert!(status.expired);
    assert_eq!(
        status.reason.as_deref(),
        Some("Subscription expired: cursorAuth/trialExpiration")
    );
}

#[test]
fn test_future_subscription_is_not_expired() {
    let fx = Fixture::new();
    let future = (Utc::now() + chrono::Duration::days(30)).timestamp();
    fx.write_storage(&format!(r#"{{"augmentcode.subscription": {future}}}"#));

    let status = fx.monitor().check_token_status(false, Duration::ZERO);
    assert!(!status.expired);
}

#[test]
fn test_epoch_threshold() {
    let secs = epoch_to_utc(1_600_000_000.0).unwrap();
    let millis = epoch_to_utc(1_600_000_000_000.0).unwrap();
    assert_eq!(secs, millis);
    assert_eq!(secs.timestamp(), 1_600_000_000);

    // Exactly 1e10 is still seconds (year 2286).
    assert_eq!(epoch_to_utc(1e10).unwrap().timestamp(), 10_000_000_000);
    assert!(epoch_to_utc(0.0).is_none());
    assert!(epoch_to_utc(-5.0).is_none());
}

#[test]
fn test_cached_status_is_reused_until_bypassed() {
    let fx = Fixture::new();
    fx.write_storage(r#"{"cursorAuth/accessToken": "abc"}"#);
    let mut monitor = fx.monitor();

    let first = monitor.check_token_status(true, Duration::from_secs(60));
    assert!(!first.expired);

    fx.write_storage(r#"{"cursorAuth/accessToken": ""}"#);
    let cached = monitor.check_token_status(true, Duration::from_secs(60));
    assert_eq!(cached, first, "fresh cache entry must be served");
    assert!(!monitor.is_token_expired());

    let fresh = monitor.check_token_status(false, Duration::from_secs(60));
    assert!(fresh.expired);
    assert!(monitor.is_token_expired(), "bypass refreshed the cache");
}
