use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::collaborators::DeviceIds;
use crate::trigger::RotationTrigger;

// ── Monitor status ───────────────────────────────────────────────

/// One log line that matched a monitored pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMatch {
    pub file: PathBuf,
    pub pattern: String,
    /// Trimmed line, capped at 200 characters.
    pub line: String,
}

/// What the config-file source saw for one known token key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenKeyInfo {
    pub exists: bool,
    pub value_length: usize,
    pub is_empty: bool,
}

/// Per-source diagnostics gathered during a token check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenFindings {
    pub storage: BTreeMap<String, TokenKeyInfo>,
    /// Matched row count per database key pattern.
    pub database: BTreeMap<String, usize>,
    pub logs: Vec<LogMatch>,
}

/// Result of a token-expiration check across all sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenStatus {
    pub expired: bool,
    /// First reason found, in source order config → database → logs.
    pub reason: Option<String>,
    pub sources_checked: BTreeSet<String>,
    pub tokens_found: TokenFindings,
    pub errors: Vec<String>,
    pub last_check: DateTime<Utc>,
}

impl TokenStatus {
    pub fn new(last_check: DateTime<Utc>) -> Self {
        Self {
            expired: false,
            reason: None,
            sources_checked: BTreeSet::new(),
            tokens_found: TokenFindings::default(),
            errors: Vec::new(),
            last_check,
        }
    }
}

/// Advisory prediction derived from the spacing of recently tracked calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsagePrediction {
    pub predicted_rate_limit: bool,
    pub confidence: f64,
    pub avg_interval_seconds: f64,
    pub calls_considered: usize,
}

/// Result of an API health / rate-limit check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiStatus {
    pub rate_limited: bool,
    pub api_healthy: bool,
    /// Latest timestamp parsed from a rate-limit log line.
    pub last_rate_limit: Option<NaiveDateTime>,
    pub rate_limit_count: u32,
    pub reason: Option<String>,
    pub errors_found: Vec<LogMatch>,
    pub errors: Vec<String>,
    pub sources_checked: BTreeSet<String>,
    pub usage_prediction: Option<UsagePrediction>,
    pub last_check: DateTime<Utc>,
}

impl ApiStatus {
    pub fn new(last_check: DateTime<Utc>) -> Self {
        Self {
            rate_limited: false,
            api_healthy: true,
            last_rate_limit: None,
            rate_limit_count: 0,
            reason: None,
            errors_found: Vec::new(),
            errors: Vec::new(),
            sources_checked: BTreeSet::new(),
            usage_prediction: None,
            last_check,
        }
    }
}

// ── Rotation record ──────────────────────────────────────────────

/// Failure taxonomy recorded in [`RotationResult::errors`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum RotationError {
    #[error("Pre-validation failed: {0}")]
    PreValidationFailed(String),

    /// Warning only; the rotation continues without a safety net.
    #[error("Backup failed: {0}")]
    BackupFailed(String),

    #[error("Mutation failed: {0}")]
    MutationFailed(String),

    #[error("Post-validation failed: {0}")]
    PostValidationFailed(String),

    #[error("Rollback failed: {0}")]
    RollbackFailed(String),

    #[error("Unhandled exception: {0}")]
    UnhandledException(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreValidation {
    pub can_proceed: bool,
    pub target_process_running: bool,
    pub permissions_ok: bool,
    pub disk_space_ok: bool,
    pub free_space_bytes: Option<u64>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEntry {
    pub original: PathBuf,
    pub backup: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupInfo {
    /// True when at least one file was snapshotted.
    pub success: bool,
    pub backup_dir: Option<PathBuf>,
    pub files: Vec<BackupEntry>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationInfo {
    pub success: bool,
    pub files_processed: Vec<String>,
    pub old_ids: DeviceIds,
    pub new_ids: DeviceIds,
    pub advanced_ids: Option<BTreeMap<String, String>>,
    pub errors: Vec<String>,
    /// Non-fatal problems (advanced fingerprint failures).
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub passed: bool,
    pub details: Vec<String>,
}

impl CheckOutcome {
    pub fn pass() -> Self {
        Self {
            passed: true,
            details: Vec::new(),
        }
    }

    pub fn fail(detail: impl Into<String>) -> Self {
        Self {
            passed: false,
            details: vec![detail.into()],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostValidation {
    pub success: bool,
    pub id_changes: CheckOutcome,
    pub token_removal: CheckOutcome,
    pub file_locks: CheckOutcome,
    pub old_traces: CheckOutcome,
    pub errors: Vec<String>,
}

impl PostValidation {
    /// Combine the four sub-checks; success only when every one passed.
    pub fn from_checks(
        id_changes: CheckOutcome,
        token_removal: CheckOutcome,
        file_locks: CheckOutcome,
        old_traces: CheckOutcome,
    ) -> Self {
        let mut errors = Vec::new();
        for (name, check) in [
            ("id_changes", &id_changes),
            ("token_removal", &token_removal),
            ("file_locks", &file_locks),
            ("old_traces", &old_traces),
        ] {
            if !check.passed {
                errors.push(format!("{name} check failed"));
            }
        }
        Self {
            success: errors.is_empty(),
            id_changes,
            token_removal,
            file_locks,
            old_traces,
            errors,
        }
    }
}

/// One rotation attempt. Immutable once appended to history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationResult {
    pub id: ulid::Ulid,
    pub timestamp: DateTime<Utc>,
    pub trigger: RotationTrigger,
    pub success: bool,
    pub duration_seconds: f64,
    #[serde(default)]
    pub pre_validation: Option<PreValidation>,
    #[serde(default)]
    pub backup_info: Option<BackupInfo>,
    #[serde(default)]
    pub rotation_info: Option<MutationInfo>,
    #[serde(default)]
    pub post_validation: Option<PostValidation>,
    #[serde(default)]
    pub errors: Vec<RotationError>,
    #[serde(default)]
    pub rollback_performed: bool,
}

impl RotationResult {
    pub fn started(trigger: RotationTrigger, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: ulid::Ulid::new(),
            timestamp,
            trigger,
            success: false,
            duration_seconds: 0.0,
            pre_validation: None,
            backup_info: None,
            rotation_info: None,
            post_validation: None,
            errors: Vec::new(),
            rollback_performed: false,
        }
    }

    /// First hard error, used for one-line summaries.
    pub fn first_error(&self) -> Option<&RotationError> {
        self.errors
            .iter()
            .find(|e| !matches!(e, RotationError::BackupFailed(_)))
    }
}

// ── Coordinator state ────────────────────────────────────────────

/// Cross-process shared record guarded by the coordinator lock.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceState {
    pub service_running: bool,
    pub rotation_in_progress: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub last_rotation: Option<DateTime<Utc>>,
    pub last_rotation_success: Option<bool>,
    pub rotation_count: u64,
    /// Set by `rotor trigger`, consumed once by the watcher.
    pub manual_trigger_requested: bool,
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
