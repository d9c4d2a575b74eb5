//! Rotation history (`rotation_history.json`).
//!
//! File shape: `{"rotations": [...], "statistics": {}}`. Pruned by age on
//! every load and capped at [`MAX_ROTATIONS`] entries.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rotor_core::types::RotationResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::retention::{self, ExportFormat, Timestamped};

pub const MAX_ROTATIONS: usize = 10_000;

/// A logged rotation: the full result plus the pool account in use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationRecord {
    #[serde(flatten)]
    pub result: RotationResult,
    #[serde(default)]
    pub account_id: Option<String>,
}

impl Timestamped for RotationRecord {
    fn timestamp(&self) -> DateTime<Utc> {
        self.result.timestamp
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RotationHistoryFile {
    #[serde(default)]
    rotations: Vec<RotationRecord>,
    #[serde(default)]
    statistics: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RotationStats {
    pub total_rotations: u64,
    pub successful_rotations: u64,
    pub failed_rotations: u64,
    pub by_trigger: BTreeMap<String, u64>,
    pub by_account: BTreeMap<String, u64>,
    pub avg_duration_seconds: f64,
    pub time_period_days: i64,
}

pub struct RotationHistory {
    path: PathBuf,
    retention: Duration,
    data: RotationHistoryFile,
}

impl RotationHistory {
    /// Load the history file, dropping entries older than `retention_days`.
    ///
    /// An unreadable or malformed file is logged and treated as empty; the
    /// next append rewrites it.
    pub fn open(path: impl Into<PathBuf>, retention_days: i64) -> Self {
        let path = path.into();
        let retention = Duration::days(retention_days);
        let mut data = match rotor_lock::state_file::read_json::<RotationHistoryFile>(&path) {
            Ok(Some(data)) => data,
            Ok(None) => RotationHistoryFile::default(),
            Err(e) => {
                warn!(path = %path.display(), "Failed to load rotation history: {e:#}");
                RotationHistoryFile::default()
            }
        };
        retention::prune_by_age(&mut data.rotations, retention, Utc::now());
        retention::cap_tail(&mut data.rotations, MAX_ROTATIONS);
        Self {
            path,
            retention,
            data,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Append one rotation and persist the file.
    pub fn log_rotation(&mut self, result: &RotationResult, account_id: Option<&str>) -> Result<()> {
        self.data.rotations.push(RotationRecord {
            result: result.clone(),
            account_id: account_id.map(str::to_string),
        });
        retention::cap_tail(&mut self.data.rotations, MAX_ROTATIONS);
        self.save()
    }

    pub fn rotations(&self) -> &[RotationRecord] {
        &self.data.rotations
    }

    /// The newest `count` entries, oldest first.
    pub fn recent(&self, count: usize) -> &[RotationRecord] {
        let rotations = &self.data.rotations;
        &rotations[rotations.len().saturating_sub(count)..]
    }

    pub fn statistics(&self, days: i64) -> RotationStats {
        let mut stats = RotationStats {
            time_period_days: days,
            ..RotationStats::default()
        };
        let mut durations = Vec::new();

        for record in retention::within(&self.data.rotations, Duration::days(days), Utc::now()) {
            stats.total_rotations += 1;
            *stats
                .by_trigger
                .entry(record.result.trigger.as_str().to_string())
                .or_default() += 1;
            if let Some(account) = &record.account_id {
                *stats.by_account.entry(account.clone()).or_default() += 1;
            }
            if record.result.success {
                stats.successful_rotations += 1;
            } else {
                stats.failed_rotations += 1;
            }
            if record.result.duration_seconds > 0.0 {
                durations.push(record.result.duration_seconds);
            }
        }

        if !durations.is_empty() {
            stats.avg_duration_seconds = durations.iter().sum::<f64>() / durations.len() as f64;
        }
        stats
    }

    pub fn export(&self, output: &Path, format: ExportFormat) -> Result<()> {
        let content = match format {
            ExportFormat::Json => serde_json::to_string_pretty(&self.data)?,
            ExportFormat::Csv => {
                let mut lines = vec!["Timestamp,Trigger,Success,Account ID,Duration (s)".to_string()];
                for record in &self.data.rotations {
                    lines.push(retention::csv_row(&[
                        record.result.timestamp.to_rfc3339(),
                        record.result.trigger.as_str().to_string(),
                        record.result.success.to_string(),
                        record.account_id.clone().unwrap_or_default(),
                        format!("{:.3}", record.result.duration_seconds),
                    ]));
                }
                lines.join("\n") + "\n"
            }
        };
        rotor_lock::state_file::atomic_write(output, content.as_bytes())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.data = RotationHistoryFile::default();
        self.save()
    }

    fn save(&self) -> Result<()> {
        rotor_lock::state_file::write_json(&self.path, &self.data)
    }
}

#[cfg(test)]
#[path = "rotation_tests.rs"]
mod tests;
