//! The rotation protocol.
//!
//! Stages run strictly in order and each is gated on the previous one:
//! pre-validation, backup, mutation, post-validation, rollback. Backup is the
//! only stage whose failure does not stop the run.

use anyhow::Result;
use chrono::Utc;
use rotor_config::RotorConfig;
use rotor_core::RotationTrigger;
use rotor_core::collaborators::{
    AdvancedFingerprintProvider, BackupStore, DeviceIds, HostSystem, IdeStateHandler,
    InstallationOptions, PathResolver,
};
use rotor_core::types::{BackupEntry, BackupInfo, MutationInfo, RotationError, RotationResult};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::{targets, validator};

/// Per-call switches for [`RotationEngine::rotate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationOptions {
    pub create_backups: bool,
    pub lock_files: bool,
    pub enable_advanced_fingerprint: bool,
}

impl Default for RotationOptions {
    fn default() -> Self {
        Self {
            create_backups: true,
            lock_files: true,
            enable_advanced_fingerprint: false,
        }
    }
}

impl RotationOptions {
    pub fn from_config(config: &RotorConfig) -> Self {
        Self {
            create_backups: config.rotation.create_backups,
            lock_files: config.rotation.lock_files,
            enable_advanced_fingerprint: config.rotation.enable_advanced_fingerprint,
        }
    }
}

/// Thresholds used by the validation stages.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub process_names: Vec<String>,
    pub min_free_space_bytes: u64,
    pub min_identifier_len: usize,
    pub residual_key_patterns: Vec<String>,
}

impl EngineSettings {
    pub fn from_config(config: &RotorConfig) -> Self {
        Self {
            process_names: config.process_names(),
            min_free_space_bytes: config.rotation.min_free_space_mb * 1024 * 1024,
            min_identifier_len: config.rotation.min_identifier_len,
            residual_key_patterns: config.rotation.residual_key_patterns.clone(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&RotorConfig::default())
    }
}

/// Invoked with the full result after every successful rotation.
pub type RotationCallback = Box<dyn Fn(&RotationResult) -> Result<()> + Send + Sync>;

pub struct RotationEngine {
    handler: Arc<dyn IdeStateHandler>,
    backups: Arc<dyn BackupStore>,
    paths: Arc<dyn PathResolver>,
    host: Arc<dyn HostSystem>,
    fingerprint: Option<Arc<dyn AdvancedFingerprintProvider>>,
    settings: EngineSettings,
    callbacks: Vec<RotationCallback>,
    last_result: Option<RotationResult>,
}

impl RotationEngine {
    pub fn new(
        handler: Arc<dyn IdeStateHandler>,
        backups: Arc<dyn BackupStore>,
        paths: Arc<dyn PathResolver>,
        host: Arc<dyn HostSystem>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            handler,
            backups,
            paths,
            host,
            fingerprint: None,
            settings,
            callbacks: Vec::new(),
            last_result: None,
        }
    }

    pub fn with_fingerprint_provider(mut self, provider: Arc<dyn AdvancedFingerprintProvider>) -> Self {
        self.fingerprint = Some(provider);
        self
    }

    pub fn register_rotation_callback(&mut self, callback: RotationCallback) {
        self.callbacks.push(callback);
    }

    pub fn last_rotation_result(&self) -> Option<&RotationResult> {
        self.last_result.as_ref()
    }

    /// Run one rotation. Never panics or returns an error: every failure is
    /// recorded in the returned result.
    pub fn rotate(&mut self, trigger: RotationTrigger, options: RotationOptions) -> RotationResult {
        let started = Instant::now();
        let mut result = RotationResult::started(trigger, Utc::now());
        info!(trigger = %trigger, "Starting rotation");

        let run = panic::catch_unwind(AssertUnwindSafe(|| self.run_stages(&mut result, options)));
        let unexpected = match run {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{e:#}")),
            Err(payload) => Some(panic_message(payload.as_ref())),
        };
        if let Some(message) = unexpected {
            error!(trigger = %trigger, "Rotation failed with unexpected error: {message}");
            result.success = false;
            result.errors.push(RotationError::UnhandledException(message));
        }
        result.duration_seconds = started.elapsed().as_secs_f64();

        if result.success {
            info!(
                trigger = %trigger,
                duration = format!("{:.2}s", result.duration_seconds),
                "Rotation completed successfully"
            );
            for callback in &self.callbacks {
                if let Err(e) = callback(&result) {
                    warn!("Rotation callback failed: {e:#}");
                }
            }
        } else if let Some(first) = result.first_error() {
            warn!(trigger = %trigger, "Rotation failed: {first}");
        }

        self.last_result = Some(result.clone());
        result
    }

    fn run_stages(&self, result: &mut RotationResult, options: RotationOptions) -> Result<()> {
        let target_dirs = self.paths.target_directories();

        let pre = validator::pre_validate(
            self.host.as_ref(),
            &target_dirs,
            self.backups.backup_dir(),
            &self.settings,
        );
        let can_proceed = pre.can_proceed;
        if !can_proceed {
            result
                .errors
                .push(RotationError::PreValidationFailed(pre.errors.join("; ")));
        }
        result.pre_validation = Some(pre);
        if !can_proceed {
            return Ok(());
        }

        let old_ids = self.handler.current_device_ids().unwrap_or_else(|e| {
            warn!("Could not read identifiers before rotation: {e:#}");
            DeviceIds::default()
        });

        if options.create_backups {
            let info = self.snapshot(&target_dirs);
            if !info.success {
                let detail = if info.errors.is_empty() {
                    "no files were backed up".to_string()
                } else {
                    info.errors.join("; ")
                };
                warn!("Backup creation had issues, continuing: {detail}");
                result.errors.push(RotationError::BackupFailed(detail));
            }
            result.backup_info = Some(info);
        }

        let mutation = self.mutate(options, old_ids);
        let mutated = mutation.success;
        if !mutated {
            result
                .errors
                .push(RotationError::MutationFailed(mutation.errors.join("; ")));
        }
        let old_ids = mutation.old_ids.clone();
        result.rotation_info = Some(mutation);
        if !mutated {
            self.rollback(result);
            return Ok(());
        }

        let post = validator::post_validate(
            self.handler.as_ref(),
            &target_dirs,
            &old_ids,
            options.lock_files,
            &self.settings,
        );
        let validated = post.success;
        if !validated {
            result
                .errors
                .push(RotationError::PostValidationFailed(post.errors.join("; ")));
        }
        result.post_validation = Some(post);
        if !validated {
            self.rollback(result);
            return Ok(());
        }

        result.success = true;
        Ok(())
    }

    fn snapshot(&self, target_dirs: &[PathBuf]) -> BackupInfo {
        let mut info = BackupInfo::default();
        for original in targets::existing_target_files(target_dirs) {
            match self.backups.create_file_backup(&original) {
                Ok(Some(backup)) => info.files.push(BackupEntry { original, backup }),
                Ok(None) => {}
                Err(e) => info.errors.push(format!("{e:#}")),
            }
        }
        info.success = !info.files.is_empty();
        if info.success {
            info.backup_dir = Some(self.backups.backup_dir().to_path_buf());
        }
        info
    }

    fn mutate(&self, options: RotationOptions, old_ids: DeviceIds) -> MutationInfo {
        let request = InstallationOptions {
            create_backups: options.create_backups,
            lock_files: options.lock_files,
            clean_workspace: false,
            clean_cache: false,
        };
        let mut info = MutationInfo {
            old_ids,
            ..MutationInfo::default()
        };

        match self.handler.process_installations(&request) {
            Ok(outcome) => {
                info.success = outcome.success;
                info.files_processed = outcome.files_processed;
                if !outcome.old_ids.is_empty() {
                    info.old_ids = outcome.old_ids;
                }
                info.new_ids = outcome.new_ids;
                info.errors = outcome.errors;
                if !info.success && info.errors.is_empty() {
                    info.errors.push("IDE state handler reported failure".to_string());
                }
            }
            Err(e) => {
                error!("IDE state handler failed: {e:#}");
                info.errors.push(format!("{e:#}"));
            }
        }

        if info.success && options.enable_advanced_fingerprint {
            match &self.fingerprint {
                None => info
                    .warnings
                    .push("Advanced fingerprinting not available".to_string()),
                Some(provider) => match provider.rotate_all_identifiers() {
                    Ok(outcome) if outcome.success => info.advanced_ids = Some(outcome.identifiers),
                    Ok(outcome) => info.warnings.extend(outcome.errors),
                    Err(e) => info.warnings.push(format!("{e:#}")),
                },
            }
            for warning in &info.warnings {
                warn!("Advanced fingerprinting: {warning}");
            }
        }
        info
    }

    /// Restore every file snapshotted during this run. Does nothing when no
    /// backup was taken.
    fn rollback(&self, result: &mut RotationResult) {
        let Some(info) = result.backup_info.as_ref().filter(|b| b.success) else {
            return;
        };

        let failures: Vec<String> = info
            .files
            .iter()
            .filter_map(|entry| {
                self.backups
                    .restore_file_backup(&entry.backup, &entry.original)
                    .err()
                    .map(|e| format!("{}: {e:#}", entry.original.display()))
            })
            .collect();

        if failures.is_empty() {
            info!(files = info.files.len(), "Rollback restored all backed-up files");
            result.rollback_performed = true;
        } else {
            error!("Rollback failed for {} file(s)", failures.len());
            result
                .errors
                .push(RotationError::RollbackFailed(failures.join("; ")));
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
