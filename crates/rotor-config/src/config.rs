//! User configuration (`~/.config/rotor/config.toml`).
//!
//! Every section and key is optional; anything missing takes the default
//! below, and a missing file yields `RotorConfig::default()`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotorConfig {
    pub rotation: RotationConfig,
    pub monitor: MonitorConfig,
    pub service: ServiceConfig,
    pub coordination: CoordinationConfig,
    pub notification: NotificationConfig,
    pub history: HistoryConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    pub scheduled_interval_hours: f64,
    pub enable_token_check: bool,
    pub enable_rate_limit_check: bool,
    pub enable_scheduled_rotation: bool,
    pub create_backups: bool,
    pub lock_files: bool,
    pub enable_advanced_fingerprint: bool,
    pub min_free_space_mb: u64,
    pub min_identifier_len: usize,
    /// `ItemTable` key patterns that must be gone after a rotation.
    pub residual_key_patterns: Vec<String>,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            scheduled_interval_hours: 12.0,
            enable_token_check: true,
            enable_rate_limit_check: true,
            enable_scheduled_rotation: true,
            create_backups: true,
            lock_files: true,
            enable_advanced_fingerprint: false,
            min_free_space_mb: 100,
            min_identifier_len: 10,
            residual_key_patterns: vec!["%augment%".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub token_cache_seconds: u64,
    pub api_cache_seconds: u64,
    pub token_log_tail_lines: usize,
    pub api_log_tail_lines: usize,
    pub max_log_files: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            token_cache_seconds: 60,
            api_cache_seconds: 30,
            token_log_tail_lines: 1000,
            api_log_tail_lines: 2000,
            max_log_files: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub poll_interval_seconds: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 60,
        }
    }
}

impl ServiceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    /// Override for `<state_dir>/service_state.json`.
    pub state_file: Option<PathBuf>,
    pub lock_timeout_seconds: f64,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            state_file: None,
            lock_timeout_seconds: 5.0,
        }
    }
}

impl CoordinationConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.lock_timeout_seconds.max(0.0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enable_log: bool,
    pub respect_quiet_hours: bool,
    pub quiet_hours_start: u32,
    pub quiet_hours_end: u32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enable_log: true,
            respect_quiet_hours: true,
            quiet_hours_start: 22,
            quiet_hours_end: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub rotation_retention_days: i64,
    pub api_retention_days: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            rotation_retention_days: 90,
            api_retention_days: 30,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// IDE state directories; empty means the per-family defaults.
    pub target_dirs: Vec<PathBuf>,
    /// IDE log directories; empty means the per-family defaults.
    pub log_dirs: Vec<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    /// Process names that must not be running during a rotation.
    pub process_names: Vec<String>,
    /// External program performing the identifier rotation.
    pub handler_command: Option<String>,
    /// Override for the whole state directory.
    pub state_dir: Option<PathBuf>,
}

impl RotorConfig {
    /// Load from the default location, or defaults if it does not exist.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        Ok(config)
    }

    pub fn config_path() -> Option<PathBuf> {
        paths::config_dir().map(|dir| dir.join("config.toml"))
    }

    pub fn state_dir(&self) -> PathBuf {
        self.paths.state_dir.clone().unwrap_or_else(paths::state_dir)
    }

    pub fn service_state_file(&self) -> PathBuf {
        self.coordination
            .state_file
            .clone()
            .unwrap_or_else(|| self.state_dir().join(paths::SERVICE_STATE_FILE))
    }

    pub fn rotation_history_file(&self) -> PathBuf {
        self.state_dir().join(paths::ROTATION_HISTORY_FILE)
    }

    pub fn api_history_file(&self) -> PathBuf {
        self.state_dir().join(paths::API_HISTORY_FILE)
    }

    pub fn account_pool_file(&self) -> PathBuf {
        self.state_dir().join(paths::ACCOUNT_POOL_FILE)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.state_dir().join(paths::LOG_DIR)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.paths
            .backup_dir
            .clone()
            .unwrap_or_else(|| self.state_dir().join(paths::BACKUP_DIR))
    }

    pub fn target_dirs(&self) -> Vec<PathBuf> {
        if self.paths.target_dirs.is_empty() {
            paths::default_target_dirs()
        } else {
            self.paths.target_dirs.clone()
        }
    }

    pub fn log_dirs(&self) -> Vec<PathBuf> {
        if self.paths.log_dirs.is_empty() {
            paths::default_log_dirs()
        } else {
            self.paths.log_dirs.clone()
        }
    }

    pub fn process_names(&self) -> Vec<String> {
        if self.paths.process_names.is_empty() {
            paths::IDE_FAMILIES.iter().map(|f| f.to_lowercase()).collect()
        } else {
            self.paths.process_names.clone()
        }
    }

    /// Commented template written by `rotor config init`.
    pub fn template() -> String {
        r#"# rotor configuration. Every key is optional.

[rotation]
# scheduled_interval_hours = 12.0
# enable_token_check = true
# enable_rate_limit_check = true
# enable_scheduled_rotation = true
# create_backups = true
# lock_files = true
# min_free_space_mb = 100

[monitor]
# token_cache_seconds = 60
# api_cache_seconds = 30

[service]
# poll_interval_seconds = 60

[coordination]
# lock_timeout_seconds = 5.0

[notification]
# respect_quiet_hours = true
# quiet_hours_start = 22
# quiet_hours_end = 8

[history]
# rotation_retention_days = 90
# api_retention_days = 30

[paths]
# handler_command = "/usr/local/bin/ide-state-handler"
# target_dirs = []
# log_dirs = []
"#
        .to_string()
    }
}
