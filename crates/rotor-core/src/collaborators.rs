//! Narrow interfaces to collaborators the rotation core calls but does not
//! implement: the IDE state handler, backup storage, target discovery,
//! OS-level fingerprinting, notification sinks, and host facts.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::trigger::RotationTrigger;
use crate::types::RotationResult;

/// Identifiers currently stored by the IDE installations.
///
/// `storage_ids` is keyed by installation variant, then by key name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceIds {
    pub storage_ids: BTreeMap<String, BTreeMap<String, String>>,
    pub database_ids: BTreeMap<String, String>,
}

impl DeviceIds {
    pub fn is_empty(&self) -> bool {
        self.storage_ids.values().all(BTreeMap::is_empty) && self.database_ids.is_empty()
    }

    /// Flattened `(label, value)` pairs; labels are `storage:<variant>/<key>`
    /// or `database:<key>` so pre/post snapshots can be compared by label.
    pub fn labelled(&self) -> BTreeMap<String, &str> {
        let mut out = BTreeMap::new();
        for (variant, ids) in &self.storage_ids {
            for (key, value) in ids {
                out.insert(format!("storage:{variant}/{key}"), value.as_str());
            }
        }
        for (key, value) in &self.database_ids {
            out.insert(format!("database:{key}"), value.as_str());
        }
        out
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallationOptions {
    pub create_backups: bool,
    pub lock_files: bool,
    pub clean_workspace: bool,
    pub clean_cache: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallationOutcome {
    pub success: bool,
    pub files_processed: Vec<String>,
    pub old_ids: DeviceIds,
    pub new_ids: DeviceIds,
    pub errors: Vec<String>,
}

/// Performs the actual identifier regeneration on IDE state.
pub trait IdeStateHandler: Send + Sync {
    fn process_installations(&self, options: &InstallationOptions) -> Result<InstallationOutcome>;
    fn current_device_ids(&self) -> Result<DeviceIds>;
}

/// Snapshot storage for files about to be mutated.
pub trait BackupStore: Send + Sync {
    /// Directory backups are written to; also used for the free-space check.
    fn backup_dir(&self) -> &Path;
    /// Copy `path` into the store. `Ok(None)` when there was nothing to copy.
    fn create_file_backup(&self, path: &Path) -> Result<Option<PathBuf>>;
    /// Put a snapshot back over `original`.
    fn restore_file_backup(&self, backup: &Path, original: &Path) -> Result<()>;
}

/// Enumerates the IDE state directories rotation touches.
pub trait PathResolver: Send + Sync {
    fn target_directories(&self) -> Vec<PathBuf>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FingerprintOutcome {
    pub success: bool,
    pub identifiers: BTreeMap<String, String>,
    pub errors: Vec<String>,
}

/// Optional, platform-specific, privileged OS identifier rotation.
pub trait AdvancedFingerprintProvider: Send + Sync {
    fn rotate_all_identifiers(&self) -> Result<FingerprintOutcome>;
}

/// Fire-and-forget sink for operator-facing events.
///
/// Implementations must not panic or block for long; nothing they do may
/// affect the rotation outcome.
pub trait Notifier: Send + Sync {
    fn notify_rotation_start(&self, trigger: RotationTrigger, reason: Option<&str>);
    fn notify_rotation_complete(&self, trigger: RotationTrigger, success: bool, result: &RotationResult);
    fn notify_error(&self, message: &str);
    fn notify_service_started(&self) {}
    fn notify_service_stopped(&self) {}
}

/// Host facts needed by pre-validation.
pub trait HostSystem: Send + Sync {
    /// True if any running process name matches one of `names`
    /// (case-insensitive, `.exe` suffix ignored).
    fn is_process_running(&self, names: &[String]) -> bool;
    /// Bytes available to unprivileged users on the filesystem holding `path`.
    fn free_space(&self, path: &Path) -> Result<u64>;
}
