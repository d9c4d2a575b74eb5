//! Advisory cross-process state shared by the watcher and one-shot runs.
//!
//! Writes are read-modify-write under the sibling `.lock` file. Reads skip
//! the lock and may be one write behind. A lock timeout turns a write into a
//! logged no-op.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rotor_core::types::ServiceState;
use rotor_lock::state_file;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

const HOLDER: &str = "service-coordinator";

#[derive(Debug, Clone)]
pub struct ServiceCoordinator {
    state_file: PathBuf,
    lock_file: PathBuf,
    lock_timeout: Duration,
}

impl ServiceCoordinator {
    pub fn new(state_file: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        let state_file = state_file.into();
        let lock_file = rotor_lock::lock_path_for(&state_file);
        Self {
            state_file,
            lock_file,
            lock_timeout,
        }
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    pub fn lock_file(&self) -> &Path {
        &self.lock_file
    }

    /// Current state; an unreadable file reads as the default state.
    pub fn get_state(&self) -> ServiceState {
        match state_file::read_json(&self.state_file) {
            Ok(state) => state.unwrap_or_default(),
            Err(e) => {
                warn!("Failed to read service state: {e:#}");
                ServiceState::default()
            }
        }
    }

    /// Apply `f` to the persisted state under the lock. Returns whether the
    /// write happened.
    fn update(&self, op: &str, f: impl FnOnce(&mut ServiceState)) -> bool {
        let outcome = rotor_lock::with_lock(&self.lock_file, HOLDER, self.lock_timeout, || {
            let mut state = self.get_state();
            f(&mut state);
            state_file::write_json(&self.state_file, &state)
        });
        match outcome {
            Ok(Some(())) => {
                debug!(op, "Service state updated");
                true
            }
            Ok(None) => {
                warn!(
                    op,
                    holder = rotor_lock::describe_holder(&self.lock_file)
                        .as_deref()
                        .unwrap_or("unknown"),
                    "Failed to acquire lock for {op}"
                );
                false
            }
            Err(e) => {
                warn!(op, "Failed to update service state: {e:#}");
                false
            }
        }
    }

    pub fn mark_service_running(&self) -> bool {
        self.update("mark_service_running", |s| {
            s.service_running = true;
            s.last_check = Some(Utc::now());
        })
    }

    pub fn mark_service_stopped(&self) -> bool {
        self.update("mark_service_stopped", |s| s.service_running = false)
    }

    pub fn mark_rotation_in_progress(&self) -> bool {
        self.update("mark_rotation_in_progress", |s| s.rotation_in_progress = true)
    }

    pub fn mark_rotation_idle(&self) -> bool {
        self.update("mark_rotation_idle", |s| s.rotation_in_progress = false)
    }

    pub fn mark_rotation_complete(&self, success: bool) -> bool {
        self.update("mark_rotation_complete", |s| {
            s.rotation_in_progress = false;
            s.last_rotation = Some(Utc::now());
            s.last_rotation_success = Some(success);
            s.rotation_count += 1;
        })
    }

    pub fn update_status(
        &self,
        last_check: Option<DateTime<Utc>>,
        rotation_in_progress: Option<bool>,
    ) -> bool {
        self.update("update_status", |s| {
            if let Some(at) = last_check {
                s.last_check = Some(at);
            }
            if let Some(flag) = rotation_in_progress {
                s.rotation_in_progress = flag;
            }
        })
    }

    /// Ask whichever process runs the watcher to rotate on its next pass.
    pub fn request_manual_trigger(&self) -> bool {
        self.update("request_manual_trigger", |s| s.manual_trigger_requested = true)
    }

    /// Consume a pending manual request. False when none was pending or the
    /// lock could not be taken.
    pub fn take_manual_trigger(&self) -> bool {
        let mut taken = false;
        let written = self.update("take_manual_trigger", |s| {
            taken = std::mem::take(&mut s.manual_trigger_requested);
        });
        written && taken
    }

    pub fn is_service_running(&self) -> bool {
        self.get_state().service_running
    }

    pub fn is_rotation_in_progress(&self) -> bool {
        self.get_state().rotation_in_progress
    }

    pub fn last_rotation(&self) -> Option<DateTime<Utc>> {
        self.get_state().last_rotation
    }

    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        self.get_state().last_check
    }

    /// Delete the state and lock files.
    pub fn clear_state(&self) -> Result<()> {
        for path in [&self.state_file, &self.lock_file] {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn coordinator(dir: &Path) -> ServiceCoordinator {
        ServiceCoordinator::new(dir.join("service_state.json"), Duration::from_secs(1))
    }

    #[test]
    fn test_missing_state_reads_default() {
        let dir = tempdir().unwrap();
        let c = coordinator(dir.path());
        assert_eq!(c.get_state(), ServiceState::default());
        assert!(!c.is_rotation_in_progress());
        assert_eq!(c.last_rotation(), None);
    }

    #[test]
    fn test_in_progress_then_complete_counts_once() {
        let dir = tempdir().unwrap();
        let c = coordinator(dir.path());

        assert!(c.mark_rotation_in_progress());
        assert!(c.mark_rotation_in_progress());
        assert!(c.is_rotation_in_progress());

        assert!(c.mark_rotation_complete(true));
        let state = c.get_state();
        assert!(!state.rotation_in_progress);
        assert_eq!(state.rotation_count, 1);
        assert_eq!(state.last_rotation_success, Some(true));
        assert!(state.last_rotation.is_some());
    }

    #[test]
    fn test_service_running_flags() {
        let dir = tempdir().unwrap();
        let c = coordinator(dir.path());

        c.mark_service_running();
        assert!(c.is_service_running());
        assert!(c.last_check().is_some());
        c.mark_service_stopped();
        assert!(!c.is_service_running());
    }

    #[test]
    fn test_update_status_only_touches_given_fields() {
        let dir = tempdir().unwrap();
        let c = coordinator(dir.path());
        c.mark_rotation_in_progress();

        let at = Utc::now();
        c.update_status(Some(at), None);
        let state = c.get_state();
        assert_eq!(state.last_check, Some(at));
        assert!(state.rotation_in_progress);

        c.update_status(None, Some(false));
        assert!(!c.is_rotation_in_progress());
    }

    #[test]
    fn test_manual_trigger_is_consumed_once() {
        let dir = tempdir().unwrap();
        let c = coordinator(dir.path());

        assert!(!c.take_manual_trigger());
        c.request_manual_trigger();
        assert!(c.get_state().manual_trigger_requested);
        assert!(c.take_manual_trigger());
        assert!(!c.take_manual_trigger());
    }

    #[cfg(unix)]
    #[test]
    fn test_lock_timeout_leaves_state_unchanged() {
        let dir = tempdir().unwrap();
        let c = ServiceCoordinator::new(
            dir.path().join("service_state.json"),
            Duration::from_millis(100),
        );
        c.mark_rotation_complete(true);
        let before = c.get_state();

        let _held = rotor_lock::ProcessLock::try_acquire(c.lock_file(), "other-process")
            .unwrap()
            .unwrap();
        assert!(!c.mark_rotation_in_progress());
        assert!(!c.mark_rotation_complete(false));
        assert!(!c.request_manual_trigger());
        assert_eq!(c.get_state(), before);
    }

    #[test]
    fn test_malformed_state_file_reads_default() {
        let dir = tempdir().unwrap();
        let c = coordinator(dir.path());
        std::fs::write(c.state_file(), "{not json").unwrap();
        assert_eq!(c.get_state(), ServiceState::default());

        assert!(c.mark_rotation_complete(false));
        assert_eq!(c.get_state().rotation_count, 1);
    }

    #[test]
    fn test_clear_state_removes_files() {
        let dir = tempdir().unwrap();
        let c = coordinator(dir.path());
        c.mark_service_running();
        assert!(c.state_file().exists());

        c.clear_state().unwrap();
        assert!(!c.state_file().exists());
        assert!(!c.lock_file().exists());
        c.clear_state().unwrap();
    }
}
