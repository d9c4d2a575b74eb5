//! Token-expiration detection.
//!
//! Three independent sources are examined on every fresh check, in a fixed
//! order: `storage.json`, `state.vscdb`, then recent log tails. A source that
//! already signalled expiration does not short-circuit the later ones; the
//! first reason found is kept and later sources only add diagnostics.

use chrono::{DateTime, Utc};
use regex::Regex;
use rotor_core::CachedValue;
use rotor_core::types::{LogMatch, TokenKeyInfo, TokenStatus};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

use crate::logs::{self, LogScanner};
use crate::{DATABASE_FILE, STORAGE_FILE, store};

pub const TOKEN_KEYS: [&str; 10] = [
    "cursorAuth/accessToken",
    "cursorAuth/refreshToken",
    "cursorAuth/cachedSignUpType",
    "augmentcode.accessToken",
    "augmentcode.refreshToken",
    "augmentcode.userInfo",
    "augmentcode.sessionId",
    "workos.accessToken",
    "workos.refreshToken",
    "workos.userInfo",
];

pub const SUBSCRIPTION_KEYS: [&str; 3] = [
    "cursorAuth/subscription",
    "cursorAuth/trialExpiration",
    "augmentcode.subscription",
];

pub const DB_TOKEN_PATTERNS: [&str; 5] = ["%token%", "%auth%", "%augment%", "%workos%", "%cursorAuth%"];

const LOG_TOKEN_ERRORS: [&str; 5] = [
    r"401\s+Unauthorized",
    r"token\s+expired",
    r"token\s+invalid",
    r"authentication\s+failed",
    r"access\s+denied",
];

const DB_ROW_LIMIT: usize = 10;

pub const SOURCE_STORAGE: &str = "storage.json";
pub const SOURCE_DATABASE: &str = "state.vscdb";
pub const SOURCE_LOGS: &str = "logs";

fn log_patterns() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| logs::compile_patterns(&LOG_TOKEN_ERRORS))
}

/// Interpret a stored epoch number. Values above 1e10 are milliseconds,
/// anything else is seconds.
pub fn epoch_to_utc(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    let millis = if value > 1e10 { value } else { value * 1000.0 };
    DateTime::from_timestamp_millis(millis as i64)
}

pub struct TokenMonitor {
    target_dirs: Vec<PathBuf>,
    logs: LogScanner,
    cache: CachedValue<TokenStatus>,
}

impl TokenMonitor {
    pub fn new(target_dirs: Vec<PathBuf>, logs: LogScanner, cache_ttl: Duration) -> Self {
        Self {
            target_dirs,
            logs,
            cache: CachedValue::new(cache_ttl),
        }
    }

    /// Token status, served from cache when younger than `max_age`.
    pub fn check_token_status(&mut self, use_cache: bool, max_age: Duration) -> TokenStatus {
        let target_dirs = &self.target_dirs;
        let logs = &self.logs;
        self.cache
            .get_or_refresh(use_cache, max_age, || compute_status(target_dirs, logs, Utc::now()))
    }

    /// Status using the configured cache duration.
    pub fn status(&mut self) -> TokenStatus {
        let ttl = self.cache.ttl();
        self.check_token_status(true, ttl)
    }

    pub fn is_token_expired(&mut self) -> bool {
        self.status().expired
    }

    pub fn expiration_reason(&mut self) -> Option<String> {
        self.status().reason
    }

    pub fn invalidate(&mut self) {
        self.cache.invalidate();
    }
}

/// What one source concluded.
#[derive(Default)]
struct SourceVerdict {
    expired: bool,
    reason: Option<String>,
}

impl SourceVerdict {
    fn flag(&mut self, reason: String) {
        self.expired = true;
        if self.reason.is_none() {
            self.reason = Some(reason);
        }
    }
}

fn compute_status(target_dirs: &[PathBuf], logs: &LogScanner, now: DateTime<Utc>) -> TokenStatus {
    let mut status = TokenStatus::new(now);

    let verdicts = [
        check_storage(target_dirs, now, &mut status),
        check_database(target_dirs, &mut status),
        check_logs(logs, &mut status),
    ];
    for verdict in verdicts {
        if verdict.expired {
            status.expired = true;
            if status.reason.is_none() {
                status.reason = verdict.reason;
            }
        }
    }

    debug!(
        expired = status.expired,
        reason = status.reason.as_deref().unwrap_or("-"),
        errors = status.errors.len(),
        "Token status computed"
    );
    status
}

fn check_storage(target_dirs: &[PathBuf], now: DateTime<Utc>, status: &mut TokenStatus) -> SourceVerdict {
    status.sources_checked.insert(SOURCE_STORAGE.to_string());
    let mut verdict = SourceVerdict::default();

    for dir in target_dirs {
        let path = dir.join(STORAGE_FILE);
        if !path.exists() {
            continue;
        }
        let data = match store::read_storage_json(&path) {
            Ok(data) => data,
            Err(e) => {
                status.errors.push(format!("{e:#}"));
                continue;
            }
        };

        for key in TOKEN_KEYS {
            let Some(value) = data.get(key) else {
                continue;
            };
            let blank = store::is_blank(value);
            let value_length = match value {
                _ if blank => 0,
                Value::String(s) => s.chars().count(),
                other => other.to_string().chars().count(),
            };
            status.tokens_found.storage.insert(
                key.to_string(),
                TokenKeyInfo {
                    exists: true,
                    value_length,
                    is_empty: blank,
                },
            );
            if blank {
                verdict.flag(format!("Token {key} is empty in storage.json"));
            }
        }

        for key in SUBSCRIPTION_KEYS {
            let Some(expires) = data.get(key).and_then(Value::as_f64).and_then(epoch_to_utc) else {
                continue;
            };
            if expires < now {
                verdict.flag(format!("Subscription expired: {key}"));
            }
        }
    }
    verdict
}

fn check_database(target_dirs: &[PathBuf], status: &mut TokenStatus) -> SourceVerdict {
    status.sources_checked.insert(SOURCE_DATABASE.to_string());
    let mut verdict = SourceVerdict::default();

    for dir in target_dirs {
        let path = dir.join(DATABASE_FILE);
        if !path.exists() {
            continue;
        }
        if let Err(e) = scan_database(&path, status, &mut verdict) {
            status.errors.push(format!("{e:#}"));
        }
    }
    verdict
}

fn scan_database(
    path: &std::path::Path,
    status: &mut TokenStatus,
    verdict: &mut SourceVerdict,
) -> anyhow::Result<()> {
    let conn = store::open_database(path)?;
    if !store::has_item_table(&conn)? {
        return Ok(());
    }
    for pattern in DB_TOKEN_PATTERNS {
        let rows = store::item_rows(&conn, pattern, DB_ROW_LIMIT)?;
        if rows.is_empty() {
            continue;
        }
        *status
            .tokens_found
            .database
            .entry(pattern.to_string())
            .or_default() += rows.len();
        for (key, value) in &rows {
            if store::is_empty_value(value.as_deref()) {
                verdict.flag(format!("Token record {key} is empty in database"));
            }
        }
    }
    Ok(())
}

fn check_logs(scanner: &LogScanner, status: &mut TokenStatus) -> SourceVerdict {
    status.sources_checked.insert(SOURCE_LOGS.to_string());
    let mut verdict = SourceVerdict::default();
    let mut found = Vec::new();

    let errors = scanner.scan(|file, line| {
        if let Some(pattern) = logs::first_match(log_patterns(), line) {
            found.push(LogMatch {
                file: file.to_path_buf(),
                pattern: pattern.to_string(),
                line: logs::truncate_line(line),
            });
            verdict.flag(format!("Token error found in logs: {pattern}"));
        }
    });

    status.tokens_found.logs.extend(found);
    status.errors.extend(errors);
    verdict
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
