//! Tracing setup: stderr always, plus a daily-rolling file for the watcher.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

const LOG_FILE_PREFIX: &str = "rotor.log";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Log to stderr only (initialize only once).
pub fn init_stderr() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter())
        .try_init()
        .ok();
}

/// Daily-rolling writer under `log_dir`. The guard must outlive logging.
pub fn create_watch_log_writer(log_dir: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    Ok(tracing_appender::non_blocking(appender))
}

/// Log to stderr and to a daily file in `log_dir`.
pub fn init_with_file(log_dir: &Path) -> Result<WorkerGuard> {
    let (writer, guard) = create_watch_log_writer(log_dir)?;
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr.and(writer))
        .with_env_filter(env_filter())
        .with_ansi(false)
        .try_init()
        .ok();
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_log_writer_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let log_dir = tmp.path().join("logs");

        let (_writer, _guard) = create_watch_log_writer(&log_dir).unwrap();
        assert!(log_dir.is_dir(), "log directory should be created");
    }
}
