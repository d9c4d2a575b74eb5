//! Checks run immediately before and after the mutation.

use rotor_core::collaborators::{DeviceIds, HostSystem, IdeStateHandler};
use rotor_core::types::{CheckOutcome, PostValidation, PreValidation};
use rotor_monitor::{DATABASE_FILE, STORAGE_FILE, store};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::engine::EngineSettings;
use crate::targets;

/// Token keys that must be gone from `storage.json` after a rotation.
pub const REMOVED_TOKEN_KEYS: [&str; 4] = [
    "cursorAuth/accessToken",
    "cursorAuth/refreshToken",
    "augmentcode.accessToken",
    "augmentcode.refreshToken",
];

const MIB: u64 = 1024 * 1024;

/// Gate the mutation: IDE closed, sample file writable, enough free space
/// at the backup destination.
///
/// A failed free-space lookup is logged and treated as sufficient.
pub fn pre_validate(
    host: &dyn HostSystem,
    target_dirs: &[PathBuf],
    backup_dir: &Path,
    settings: &EngineSettings,
) -> PreValidation {
    let mut pre = PreValidation {
        target_process_running: host.is_process_running(&settings.process_names),
        permissions_ok: true,
        disk_space_ok: true,
        ..PreValidation::default()
    };

    if pre.target_process_running {
        pre.errors
            .push("IDE process is still running - close it first".to_string());
    }

    if let Some(sample) = targets::existing_target_files(target_dirs).first()
        && let Err(e) = OpenOptions::new().read(true).write(true).open(sample)
    {
        pre.permissions_ok = false;
        pre.errors.push(format!(
            "Insufficient file permissions on {}: {e}",
            sample.display()
        ));
    }

    match host.free_space(backup_dir) {
        Ok(free) => {
            pre.free_space_bytes = Some(free);
            if free < settings.min_free_space_bytes {
                pre.disk_space_ok = false;
                pre.errors.push(format!(
                    "Insufficient disk space for backup: {} MB free, {} MB required",
                    free / MIB,
                    settings.min_free_space_bytes / MIB
                ));
            }
        }
        Err(e) => warn!(dir = %backup_dir.display(), "Disk space check failed: {e:#}"),
    }

    pre.can_proceed = !pre.target_process_running && pre.permissions_ok && pre.disk_space_ok;
    pre
}

/// Re-inspect mutated state. Every sub-check must pass.
pub fn post_validate(
    handler: &dyn IdeStateHandler,
    target_dirs: &[PathBuf],
    old_ids: &DeviceIds,
    lock_requested: bool,
    settings: &EngineSettings,
) -> PostValidation {
    let id_changes = match handler.current_device_ids() {
        Ok(current) => check_id_changes(old_ids, &current, settings.min_identifier_len),
        Err(e) => CheckOutcome::fail(format!("Check error: {e:#}")),
    };
    PostValidation::from_checks(
        id_changes,
        check_token_removal(target_dirs),
        check_file_locks(target_dirs, lock_requested),
        check_old_traces(target_dirs, &settings.residual_key_patterns),
    )
}

/// Identifiers exist, are long enough and differ from their previous values.
pub fn check_id_changes(old: &DeviceIds, current: &DeviceIds, min_len: usize) -> CheckOutcome {
    if current.is_empty() {
        return CheckOutcome::fail("No IDs found - rotation may not have occurred");
    }
    let before = old.labelled();
    let mut details = Vec::new();
    for (label, value) in current.labelled() {
        if value.chars().count() < min_len {
            details.push(format!("Invalid ID: {label}"));
        } else if before.get(&label) == Some(&value) {
            details.push(format!("ID unchanged: {label}"));
        }
    }
    outcome(details)
}

pub fn check_token_removal(target_dirs: &[PathBuf]) -> CheckOutcome {
    let mut details = Vec::new();
    for dir in target_dirs {
        let path = dir.join(STORAGE_FILE);
        if !path.exists() {
            continue;
        }
        match store::read_storage_json(&path) {
            Ok(data) => {
                for key in REMOVED_TOKEN_KEYS {
                    if data.get(key).is_some_and(|v| !store::is_blank(v)) {
                        details.push(format!("Token still present: {key}"));
                    }
                }
            }
            Err(e) => details.push(format!("{e:#}")),
        }
    }
    outcome(details)
}

/// Target files are read-only. Passes trivially when locking was not requested.
pub fn check_file_locks(target_dirs: &[PathBuf], lock_requested: bool) -> CheckOutcome {
    if !lock_requested {
        return CheckOutcome::pass();
    }
    let details = targets::existing_target_files(target_dirs)
        .into_iter()
        .filter(|path| {
            !std::fs::metadata(path)
                .map(|m| m.permissions().readonly())
                .unwrap_or(false)
        })
        .map(|path| format!("File not locked: {}", path.display()))
        .collect();
    outcome(details)
}

/// No `ItemTable` rows matching the residual vendor patterns remain.
pub fn check_old_traces(target_dirs: &[PathBuf], patterns: &[String]) -> CheckOutcome {
    let mut details = Vec::new();
    for dir in target_dirs {
        let db = dir.join(DATABASE_FILE);
        if !db.exists() {
            continue;
        }
        for pattern in patterns {
            match store::count_matching(&db, pattern) {
                Ok(0) => {}
                Ok(n) => details.push(format!(
                    "Found {n} records matching {pattern} in {}",
                    db.display()
                )),
                Err(e) => details.push(format!("Error checking {}: {e:#}", db.display())),
            }
        }
    }
    outcome(details)
}

fn outcome(details: Vec<String>) -> CheckOutcome {
    CheckOutcome {
        passed: details.is_empty(),
        details,
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
