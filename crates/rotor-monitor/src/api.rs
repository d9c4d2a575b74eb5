//! Rate-limit and API-health detection from log tails, plus passive
//! tracking of calls the host application reports.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use regex::Regex;
use rotor_core::CachedValue;
use rotor_core::types::{ApiStatus, LogMatch, UsagePrediction};
use rotor_history::ApiHistory;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

use crate::logs::{self, LogScanner};

const RATE_LIMIT_PATTERNS: [&str; 5] = [
    r"429\s+Too\s+Many\s+Requests",
    r"403\s+Forbidden.*rate",
    r"rate\s+limit",
    r"quota\s+exceeded",
    r"too\s+many\s+requests",
];

const API_ERROR_PATTERNS: [&str; 4] = [
    r"401\s+Unauthorized",
    r"403\s+Forbidden",
    r"500\s+Internal\s+Server\s+Error",
    r"503\s+Service\s+Unavailable",
];

/// In-memory rate-limit observations kept for [`RateLimitMonitor::get_rate_limit_history`].
pub const MAX_OBSERVATIONS: usize = 100;
/// Tracked calls considered by the usage-pattern prediction.
pub const PREDICTION_WINDOW: usize = 50;

const LOG_SOURCE: &str = "logs";

fn rate_limit_patterns() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| logs::compile_patterns(&RATE_LIMIT_PATTERNS))
}

fn api_error_patterns() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| logs::compile_patterns(&API_ERROR_PATTERNS))
}

fn timestamp_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{4}-\d{2}-\d{2})[ T](\d{2}:\d{2}:\d{2})").ok())
        .as_ref()
}

/// First `YYYY-MM-DD[ T]HH:MM:SS` timestamp on a log line.
pub fn extract_timestamp(line: &str) -> Option<NaiveDateTime> {
    let caps = timestamp_regex()?.captures(line)?;
    let text = format!("{}T{}", caps.get(1)?.as_str(), caps.get(2)?.as_str());
    NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S").ok()
}

/// Advisory prediction from the spacing of tracked calls (oldest first).
///
/// Needs at least two calls; a mean interval below one second predicts an
/// imminent rate limit with `confidence = min(0.9, 1 - mean)`.
pub fn predict_usage(calls: &[DateTime<Utc>]) -> Option<UsagePrediction> {
    if calls.len() < 2 {
        return None;
    }
    let window = &calls[calls.len().saturating_sub(PREDICTION_WINDOW)..];
    let intervals: Vec<f64> = window
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_milliseconds() as f64 / 1000.0)
        .collect();
    let avg = intervals.iter().sum::<f64>() / intervals.len() as f64;
    let predicted = avg < 1.0;
    Some(UsagePrediction {
        predicted_rate_limit: predicted,
        confidence: if predicted { (1.0 - avg).min(0.9) } else { 0.0 },
        avg_interval_seconds: avg,
        calls_considered: window.len(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitObservation {
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiHealth {
    pub healthy: bool,
    pub rate_limited: bool,
    pub last_check: DateTime<Utc>,
    /// Rate-limit observations in the last hour.
    pub recent_rate_limits: usize,
}

pub struct RateLimitMonitor {
    logs: LogScanner,
    cache: CachedValue<ApiStatus>,
    observations: Vec<RateLimitObservation>,
    recent_calls: VecDeque<DateTime<Utc>>,
    history: Option<ApiHistory>,
}

impl RateLimitMonitor {
    pub fn new(logs: LogScanner, cache_ttl: Duration) -> Self {
        Self {
            logs,
            cache: CachedValue::new(cache_ttl),
            observations: Vec::new(),
            recent_calls: VecDeque::new(),
            history: None,
        }
    }

    /// Persist tracked calls and detections to `history`, seeding the
    /// usage prediction from its most recent calls.
    pub fn with_history(mut self, history: ApiHistory) -> Self {
        self.recent_calls = history
            .recent_calls(PREDICTION_WINDOW)
            .iter()
            .map(|c| c.timestamp)
            .collect();
        self.history = Some(history);
        self
    }

    pub fn history(&self) -> Option<&ApiHistory> {
        self.history.as_ref()
    }

    pub fn check_api_status(&mut self, use_cache: bool, max_age: Duration) -> ApiStatus {
        if use_cache && let Some(status) = self.cache.get_within(max_age) {
            return status.clone();
        }
        let status = self.compute_status(Utc::now());
        if status.rate_limited {
            self.record_detection(&status);
        }
        self.cache.set(status.clone());
        status
    }

    pub fn status(&mut self) -> ApiStatus {
        let ttl = self.cache.ttl();
        self.check_api_status(true, ttl)
    }

    pub fn is_rate_limited(&mut self) -> bool {
        self.status().rate_limited
    }

    /// Record a call made by the host application.
    ///
    /// `response_time_ms` is stored as reported. A 429 is also logged as a
    /// rate-limit event and any status >= 400 as an error event.
    pub fn track_api_call(&mut self, endpoint: &str, method: &str, status_code: u16, response_time_ms: f64) {
        self.recent_calls.push_back(Utc::now());
        while self.recent_calls.len() > PREDICTION_WINDOW {
            self.recent_calls.pop_front();
        }

        let Some(history) = self.history.as_mut() else {
            return;
        };
        let error_message = (status_code >= 400).then(|| format!("HTTP {status_code}"));
        if let Err(e) = history.log_api_call(
            endpoint,
            method,
            status_code,
            response_time_ms,
            error_message.as_deref(),
        ) {
            warn!("Failed to record API call: {e:#}");
        }
        if status_code == 429
            && let Err(e) = history.log_rate_limit(endpoint, None, Some("http_429"))
        {
            warn!("Failed to record rate limit: {e:#}");
        }
        if let Some(message) = &error_message
            && let Err(e) = history.log_error(endpoint, status_code, message)
        {
            warn!("Failed to record API error: {e:#}");
        }
    }

    /// In-memory rate-limit observations from the last `hours`.
    pub fn get_rate_limit_history(&self, hours: i64) -> Vec<RateLimitObservation> {
        let cutoff = Utc::now() - ChronoDuration::hours(hours);
        self.observations
            .iter()
            .filter(|o| o.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    pub fn api_health(&mut self) -> ApiHealth {
        let status = self.status();
        ApiHealth {
            healthy: status.api_healthy,
            rate_limited: status.rate_limited,
            last_check: status.last_check,
            recent_rate_limits: self.get_rate_limit_history(1).len(),
        }
    }

    fn compute_status(&self, now: DateTime<Utc>) -> ApiStatus {
        let mut status = ApiStatus::new(now);
        status.sources_checked.insert(LOG_SOURCE.to_string());
        let mut latest: Option<NaiveDateTime> = None;
        let mut errors_found = Vec::new();
        let mut count = 0u32;
        let mut reason = None;

        let read_errors = self.logs.scan(|file, line| {
            if let Some(pattern) = logs::first_match(rate_limit_patterns(), line) {
                count += 1;
                if reason.is_none() {
                    reason = Some(format!("Rate limit detected: {pattern}"));
                }
                if let Some(ts) = extract_timestamp(line) {
                    latest = latest.max(Some(ts));
                }
            }
            if let Some(pattern) = logs::first_match(api_error_patterns(), line) {
                errors_found.push(LogMatch {
                    file: file.to_path_buf(),
                    pattern: pattern.to_string(),
                    line: logs::truncate_line(line),
                });
            }
        });

        status.rate_limited = count > 0;
        status.rate_limit_count = count;
        status.last_rate_limit = latest;
        status.reason = reason;
        status.api_healthy = errors_found.is_empty();
        status.errors_found = errors_found;
        status.errors = read_errors;

        let calls: Vec<DateTime<Utc>> = self.recent_calls.iter().copied().collect();
        status.usage_prediction = predict_usage(&calls);

        debug!(
            rate_limited = status.rate_limited,
            count = status.rate_limit_count,
            healthy = status.api_healthy,
            "API status computed"
        );
        status
    }

    fn record_detection(&mut self, status: &ApiStatus) {
        self.observations.push(RateLimitObservation {
            timestamp: status.last_check,
            reason: status.reason.clone(),
        });
        if self.observations.len() > MAX_OBSERVATIONS {
            let excess = self.observations.len() - MAX_OBSERVATIONS;
            self.observations.drain(..excess);
        }
        if let Some(history) = self.history.as_mut()
            && let Err(e) = history.log_rate_limit(LOG_SOURCE, None, status.reason.as_deref())
        {
            warn!("Failed to record rate limit: {e:#}");
        }
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
