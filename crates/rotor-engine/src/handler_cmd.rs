//! IDE state handler backed by an external program.
//!
//! The program is invoked as `<cmd> rotate [--backup] [--lock]
//! [--clean-workspace] [--clean-cache]` and `<cmd> ids`; each prints one JSON
//! document on stdout matching `InstallationOutcome` / `DeviceIds`.

use anyhow::{Context, Result};
use rotor_core::AppError;
use rotor_core::collaborators::{DeviceIds, IdeStateHandler, InstallationOptions, InstallationOutcome};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CommandStateHandler {
    program: PathBuf,
}

impl CommandStateHandler {
    /// Resolve `command` on `PATH` unless it already names a path.
    pub fn new(command: &str) -> Result<Self> {
        let candidate = Path::new(command);
        let program = if candidate.components().count() > 1 {
            candidate.to_path_buf()
        } else {
            which::which(command)
                .with_context(|| format!("State handler '{command}' not found in PATH"))?
        };
        Ok(Self { program })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T> {
        let program_display = self.program.display().to_string();
        debug!(command = %program_display, ?args, "Running state handler");
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .with_context(|| format!("Failed to spawn state handler {program_display}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                output.status.to_string()
            } else {
                stderr
            };
            return Err(AppError::HandlerFailed {
                command: program_display,
                message,
            }
            .into());
        }
        serde_json::from_slice(&output.stdout)
            .with_context(|| format!("State handler {program_display} printed invalid JSON"))
    }
}

/// Command-line arguments for one `rotate` invocation.
pub fn rotate_args(options: &InstallationOptions) -> Vec<&'static str> {
    let mut args = vec!["rotate"];
    for (enabled, flag) in [
        (options.create_backups, "--backup"),
        (options.lock_files, "--lock"),
        (options.clean_workspace, "--clean-workspace"),
        (options.clean_cache, "--clean-cache"),
    ] {
        if enabled {
            args.push(flag);
        }
    }
    args
}

impl IdeStateHandler for CommandStateHandler {
    fn process_installations(&self, options: &InstallationOptions) -> Result<InstallationOutcome> {
        self.run_json(&rotate_args(options))
    }

    fn current_device_ids(&self) -> Result<DeviceIds> {
        self.run_json(&["ids"])
    }
}

/// Stand-in used when no handler command is configured: reports no ids and
/// refuses to mutate.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredHandler;

impl IdeStateHandler for UnconfiguredHandler {
    fn process_installations(&self, _options: &InstallationOptions) -> Result<InstallationOutcome> {
        Err(AppError::HandlerNotConfigured.into())
    }

    fn current_device_ids(&self) -> Result<DeviceIds> {
        Ok(DeviceIds::default())
    }
}
