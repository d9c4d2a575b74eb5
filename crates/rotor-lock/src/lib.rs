//! Cross-process advisory locking for rotor state files.
//!
//! On Unix the lock is a raw `flock(2)` on a sibling `.lock` file, held by
//! [`ProcessLock`] which owns the `File` and calls `LOCK_UN` on drop (same
//! shape as an RAII guard, without borrowing a lock owner). Other targets go
//! through `fd-lock` inside [`with_lock`].
//!
//! Acquisition polls a non-blocking lock until a timeout elapses. Timing out
//! is not an error: callers get `None` and decide how to degrade.

pub mod state_file;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

/// Diagnostic information written to lock files while held.
#[derive(Debug, Serialize, Deserialize)]
struct LockDiagnostic {
    pid: u32,
    holder: String,
    acquired_at: DateTime<Utc>,
}

const INITIAL_POLL: Duration = Duration::from_millis(50);
const MAX_POLL: Duration = Duration::from_millis(500);

fn open_lock_file(lock_path: &Path) -> Result<File> {
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create lock directory: {}", parent.display()))?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))
}

/// Read whoever last wrote a diagnostic into `lock_path`, for log messages.
pub fn describe_holder(lock_path: &Path) -> Option<String> {
    let contents = fs::read_to_string(lock_path).ok()?;
    let diagnostic: LockDiagnostic = serde_json::from_str(&contents).ok()?;
    Some(format!(
        "PID {} ({}, since {})",
        diagnostic.pid, diagnostic.holder, diagnostic.acquired_at
    ))
}

/// Sleep schedule for lock polling: doubling, capped, never past the deadline.
fn next_sleep(current: Duration, started: Instant, timeout: Duration) -> Option<Duration> {
    let elapsed = started.elapsed();
    if elapsed >= timeout {
        return None;
    }
    Some(current.min(timeout - elapsed))
}

#[cfg(unix)]
mod unix {
    use super::*;
    use std::io::Write;
    use std::os::unix::io::AsRawFd;

    /// Exclusive advisory lock backed by `flock(2)`.
    pub struct ProcessLock {
        file: File,
        lock_path: PathBuf,
    }

    impl std::fmt::Debug for ProcessLock {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("ProcessLock")
                .field("lock_path", &self.lock_path)
                .finish()
        }
    }

    impl Drop for ProcessLock {
        fn drop(&mut self) {
            let fd = self.file.as_raw_fd();
            // SAFETY: `fd` is a valid file descriptor owned by `self.file`.
            // If LOCK_UN fails the lock is still released when the fd closes.
            unsafe {
                libc::flock(fd, libc::LOCK_UN);
            }
        }
    }

    impl ProcessLock {
        pub fn lock_path(&self) -> &Path {
            &self.lock_path
        }

        /// Single non-blocking attempt. `Ok(None)` if another holder has it.
        pub fn try_acquire(lock_path: &Path, holder: &str) -> Result<Option<Self>> {
            let file = open_lock_file(lock_path)?;
            let fd = file.as_raw_fd();

            // SAFETY: `fd` is a valid file descriptor from the `File` we just
            // opened. `LOCK_EX | LOCK_NB` requests an exclusive non-blocking lock.
            let ret = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
            if ret != 0 {
                return Ok(None);
            }

            let mut lock = ProcessLock {
                file,
                lock_path: lock_path.to_path_buf(),
            };
            let diagnostic = LockDiagnostic {
                pid: std::process::id(),
                holder: holder.to_string(),
                acquired_at: Utc::now(),
            };
            // Diagnostics are best-effort; the flock is what matters.
            if let Ok(json) = serde_json::to_string(&diagnostic) {
                let _ = lock.file.set_len(0);
                let _ = lock.file.write_all(json.as_bytes());
                let _ = lock.file.flush();
            }
            Ok(Some(lock))
        }

        /// Poll [`ProcessLock::try_acquire`] until `timeout` elapses.
        pub fn acquire(lock_path: &Path, holder: &str, timeout: Duration) -> Result<Option<Self>> {
            let started = Instant::now();
            let mut sleep = INITIAL_POLL;
            loop {
                if let Some(lock) = Self::try_acquire(lock_path, holder)? {
                    return Ok(Some(lock));
                }
                match next_sleep(sleep, started, timeout) {
                    Some(wait) => std::thread::sleep(wait),
                    None => {
                        debug!(
                            lock = %lock_path.display(),
                            holder = describe_holder(lock_path).as_deref().unwrap_or("unknown"),
                            "Lock acquisition timed out"
                        );
                        return Ok(None);
                    }
                }
                sleep = (sleep * 2).min(MAX_POLL);
            }
        }
    }
}

#[cfg(unix)]
pub use unix::ProcessLock;

/// Run `f` while holding the exclusive lock at `lock_path`.
///
/// Returns `Ok(None)` without running `f` if the lock was not acquired
/// within `timeout`.
#[cfg(unix)]
pub fn with_lock<T>(
    lock_path: &Path,
    holder: &str,
    timeout: Duration,
    f: impl FnOnce() -> Result<T>,
) -> Result<Option<T>> {
    let Some(_lock) = ProcessLock::acquire(lock_path, holder, timeout)? else {
        return Ok(None);
    };
    f().map(Some)
}

#[cfg(not(unix))]
pub fn with_lock<T>(
    lock_path: &Path,
    holder: &str,
    timeout: Duration,
    f: impl FnOnce() -> Result<T>,
) -> Result<Option<T>> {
    let file = open_lock_file(lock_path)?;
    let mut lock = fd_lock::RwLock::new(file);
    let started = Instant::now();
    let mut sleep = INITIAL_POLL;
    loop {
        if let Ok(_guard) = lock.try_write() {
            debug!(lock = %lock_path.display(), holder, "Lock acquired");
            return f().map(Some);
        }
        match next_sleep(sleep, started, timeout) {
            Some(wait) => std::thread::sleep(wait),
            None => return Ok(None),
        }
        sleep = (sleep * 2).min(MAX_POLL);
    }
}

/// Sibling lock path for a state file: `service_state.json` → `service_state.lock`.
pub fn lock_path_for(state_file: &Path) -> PathBuf {
    state_file.with_extension("lock")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_try_acquire_succeeds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.lock");

        let lock = ProcessLock::try_acquire(&path, "watcher").unwrap();
        assert!(lock.is_some(), "first acquisition should succeed");
        assert!(path.exists());
    }

    #[test]
    fn test_second_acquire_is_refused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.lock");

        let _held = ProcessLock::try_acquire(&path, "watcher").unwrap().unwrap();
        let second = ProcessLock::try_acquire(&path, "scheduled-task").unwrap();
        assert!(second.is_none(), "flock on a second open file must fail");
    }

    #[test]
    fn test_acquire_times_out_while_held() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.lock");

        let _held = ProcessLock::try_acquire(&path, "watcher").unwrap().unwrap();
        let started = Instant::now();
        let second = ProcessLock::acquire(&path, "scheduled-task", Duration::from_millis(200)).unwrap();
        assert!(second.is_none());
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "polling must not overshoot the timeout by much"
        );
    }

    #[test]
    fn test_released_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.lock");

        {
            let _held = ProcessLock::try_acquire(&path, "watcher").unwrap().unwrap();
        }
        let again = ProcessLock::try_acquire(&path, "watcher").unwrap();
        assert!(again.is_some(), "lock must be free once the guard drops");
    }

    #[test]
    fn test_diagnostic_names_holder() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.lock");

        let _held = ProcessLock::try_acquire(&path, "watcher").unwrap().unwrap();
        let holder = describe_holder(&path).unwrap();
        assert!(holder.contains(&std::process::id().to_string()));
        assert!(holder.contains("watcher"));
    }

    #[test]
    fn test_with_lock_runs_closure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.lock");

        let value = with_lock(&path, "test", Duration::from_secs(1), || Ok(41 + 1)).unwrap();
        assert_eq!(value, Some(42));
    }

    #[test]
    fn test_with_lock_skips_closure_on_timeout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.lock");

        let _held = ProcessLock::try_acquire(&path, "watcher").unwrap().unwrap();
        let mut ran = false;
        let value = with_lock(&path, "test", Duration::from_millis(100), || {
            ran = true;
            Ok(())
        })
        .unwrap();
        assert!(value.is_none());
        assert!(!ran);
    }

    #[test]
    fn test_with_lock_propagates_closure_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.lock");

        let result: Result<Option<()>> =
            with_lock(&path, "test", Duration::from_secs(1), || anyhow::bail!("boom"));
        assert!(result.is_err());
    }

    #[test]
    fn test_lock_path_for_state_file() {
        assert_eq!(
            lock_path_for(Path::new("/x/service_state.json")),
            PathBuf::from("/x/service_state.lock")
        );
    }

    #[test]
    fn test_invalid_parent_fails() {
        let result = ProcessLock::try_acquire(Path::new("/dev/null/state.lock"), "t");
        assert!(result.is_err());
    }
}
