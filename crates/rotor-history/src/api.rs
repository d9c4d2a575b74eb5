//! API call history (`api_history.json`).
//!
//! Three append-only lists, each pruned by age on load and capped at its
//! own maximum on load and on every append.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::retention::{self, ExportFormat, Timestamped};

pub const MAX_API_CALLS: usize = 10_000;
pub const MAX_RATE_LIMITS: usize = 1_000;
pub const MAX_ERRORS: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCall {
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    pub method: String,
    pub status_code: u16,
    pub response_time: f64,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitEvent {
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    #[serde(default)]
    pub retry_after: Option<u64>,
    #[serde(default)]
    pub limit_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorEvent {
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    pub status_code: u16,
    pub error_message: String,
}

impl Timestamped for ApiCall {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timestamped for RateLimitEvent {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timestamped for ApiErrorEvent {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ApiHistoryFile {
    #[serde(default)]
    api_calls: Vec<ApiCall>,
    #[serde(default)]
    rate_limits: Vec<RateLimitEvent>,
    #[serde(default)]
    errors: Vec<ApiErrorEvent>,
    #[serde(default)]
    statistics: serde_json::Map<String, serde_json::Value>,
}

impl ApiHistoryFile {
    fn enforce_limits(&mut self, retention: Duration, now: DateTime<Utc>) {
        retention::prune_by_age(&mut self.api_calls, retention, now);
        retention::prune_by_age(&mut self.rate_limits, retention, now);
        retention::prune_by_age(&mut self.errors, retention, now);
        self.cap();
    }

    fn cap(&mut self) {
        retention::cap_tail(&mut self.api_calls, MAX_API_CALLS);
        retention::cap_tail(&mut self.rate_limits, MAX_RATE_LIMITS);
        retention::cap_tail(&mut self.errors, MAX_ERRORS);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApiStats {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub rate_limits: u64,
    pub errors: u64,
    pub avg_response_time: f64,
    pub endpoints: BTreeMap<String, u64>,
    pub status_codes: BTreeMap<u16, u64>,
    pub time_period_hours: i64,
}

pub struct ApiHistory {
    path: PathBuf,
    data: ApiHistoryFile,
}

impl ApiHistory {
    pub fn open(path: impl Into<PathBuf>, retention_days: i64) -> Self {
        let path = path.into();
        let mut data = match rotor_lock::state_file::read_json::<ApiHistoryFile>(&path) {
            Ok(Some(data)) => data,
            Ok(None) => ApiHistoryFile::default(),
            Err(e) => {
                warn!(path = %path.display(), "Failed to load API history: {e:#}");
                ApiHistoryFile::default()
            }
        };
        data.enforce_limits(Duration::days(retention_days), Utc::now());
        Self { path, data }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log_api_call(
        &mut self,
        endpoint: &str,
        method: &str,
        status_code: u16,
        response_time: f64,
        error_message: Option<&str>,
    ) -> Result<()> {
        self.data.api_calls.push(ApiCall {
            timestamp: Utc::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            status_code,
            response_time,
            error_message: error_message.map(str::to_string),
        });
        self.data.cap();
        self.save()
    }

    pub fn log_rate_limit(
        &mut self,
        endpoint: &str,
        retry_after: Option<u64>,
        limit_type: Option<&str>,
    ) -> Result<()> {
        self.data.rate_limits.push(RateLimitEvent {
            timestamp: Utc::now(),
            endpoint: endpoint.to_string(),
            retry_after,
            limit_type: limit_type.map(str::to_string),
        });
        self.data.cap();
        self.save()
    }

    pub fn log_error(&mut self, endpoint: &str, status_code: u16, error_message: &str) -> Result<()> {
        self.data.errors.push(ApiErrorEvent {
            timestamp: Utc::now(),
            endpoint: endpoint.to_string(),
            status_code,
            error_message: error_message.to_string(),
        });
        self.data.cap();
        self.save()
    }

    pub fn api_calls(&self) -> &[ApiCall] {
        &self.data.api_calls
    }

    pub fn rate_limits(&self) -> &[RateLimitEvent] {
        &self.data.rate_limits
    }

    pub fn errors(&self) -> &[ApiErrorEvent] {
        &self.data.errors
    }

    /// The newest `count` calls, oldest first.
    pub fn recent_calls(&self, count: usize) -> &[ApiCall] {
        let calls = &self.data.api_calls;
        &calls[calls.len().saturating_sub(count)..]
    }

    pub fn recent_rate_limits(&self, hours: i64) -> Vec<&RateLimitEvent> {
        retention::within(&self.data.rate_limits, Duration::hours(hours), Utc::now())
    }

    pub fn recent_errors(&self, hours: i64) -> Vec<&ApiErrorEvent> {
        retention::within(&self.data.errors, Duration::hours(hours), Utc::now())
    }

    pub fn statistics(&self, hours: i64) -> ApiStats {
        let now = Utc::now();
        let window = Duration::hours(hours);
        let mut stats = ApiStats {
            time_period_hours: hours,
            ..ApiStats::default()
        };
        let mut response_times = Vec::new();

        for call in retention::within(&self.data.api_calls, window, now) {
            stats.total_calls += 1;
            if (200..300).contains(&call.status_code) {
                stats.successful_calls += 1;
            } else {
                stats.failed_calls += 1;
            }
            *stats.endpoints.entry(call.endpoint.clone()).or_default() += 1;
            *stats.status_codes.entry(call.status_code).or_default() += 1;
            if call.response_time > 0.0 {
                response_times.push(call.response_time);
            }
        }
        stats.rate_limits = retention::within(&self.data.rate_limits, window, now).len() as u64;
        stats.errors = retention::within(&self.data.errors, window, now).len() as u64;

        if !response_times.is_empty() {
            stats.avg_response_time =
                response_times.iter().sum::<f64>() / response_times.len() as f64;
        }
        stats
    }

    pub fn export(&self, output: &Path, format: ExportFormat) -> Result<()> {
        let content = match format {
            ExportFormat::Json => serde_json::to_string_pretty(&self.data)?,
            ExportFormat::Csv => {
                let mut lines = vec![
                    "Timestamp,Endpoint,Method,Status Code,Response Time,Error Message".to_string(),
                ];
                for call in &self.data.api_calls {
                    lines.push(retention::csv_row(&[
                        call.timestamp.to_rfc3339(),
                        call.endpoint.clone(),
                        call.method.clone(),
                        call.status_code.to_string(),
                        format!("{:.3}", call.response_time),
                        call.error_message.clone().unwrap_or_default(),
                    ]));
                }
                lines.join("\n") + "\n"
            }
        };
        rotor_lock::state_file::atomic_write(output, content.as_bytes())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.data = ApiHistoryFile::default();
        self.save()
    }

    fn save(&self) -> Result<()> {
        rotor_lock::state_file::write_json(&self.path, &self.data)
    }
}
