//! Builds the runtime object graph from a loaded [`RotorConfig`].

use anyhow::Result;
use rotor_config::RotorConfig;
use rotor_core::collaborators::IdeStateHandler;
use rotor_engine::{
    CommandStateHandler, ConfiguredPaths, EngineSettings, FsBackupStore, RotationEngine,
    RotationOptions, SysinfoHost, UnconfiguredHandler,
};
use rotor_history::{ApiHistory, RotationHistory};
use rotor_monitor::{LogScanner, RateLimitMonitor, TokenMonitor};
use rotor_scheduler::{AccountPool, HybridRotationScheduler, SchedulerSettings};
use rotor_service::{LogNotifier, ServiceCoordinator, Watcher};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub fn token_monitor(config: &RotorConfig) -> TokenMonitor {
    let logs = LogScanner::new(
        config.log_dirs(),
        config.monitor.max_log_files,
        config.monitor.token_log_tail_lines,
    );
    TokenMonitor::new(
        config.target_dirs(),
        logs,
        Duration::from_secs(config.monitor.token_cache_seconds),
    )
}

pub fn rate_limit_monitor(config: &RotorConfig) -> RateLimitMonitor {
    let logs = LogScanner::new(
        config.log_dirs(),
        config.monitor.max_log_files,
        config.monitor.api_log_tail_lines,
    );
    RateLimitMonitor::new(logs, Duration::from_secs(config.monitor.api_cache_seconds))
        .with_history(api_history(config))
}

pub fn api_history(config: &RotorConfig) -> ApiHistory {
    ApiHistory::open(config.api_history_file(), config.history.api_retention_days)
}

pub fn rotation_history(config: &RotorConfig) -> RotationHistory {
    RotationHistory::open(
        config.rotation_history_file(),
        config.history.rotation_retention_days,
    )
}

pub fn scheduler(config: &RotorConfig) -> HybridRotationScheduler {
    HybridRotationScheduler::new(
        Box::new(token_monitor(config)),
        Box::new(rate_limit_monitor(config)),
        SchedulerSettings::from(&config.rotation),
    )
}

pub fn coordinator(config: &RotorConfig) -> ServiceCoordinator {
    ServiceCoordinator::new(config.service_state_file(), config.coordination.lock_timeout())
}

pub fn account_pool(config: &RotorConfig) -> AccountPool {
    AccountPool::new(config.account_pool_file(), config.coordination.lock_timeout())
}

/// The configured handler program, or a stand-in that refuses to rotate.
pub fn state_handler(config: &RotorConfig) -> Result<Arc<dyn IdeStateHandler>> {
    match config.paths.handler_command.as_deref() {
        Some(command) => Ok(Arc::new(CommandStateHandler::new(command)?)),
        None => {
            warn!("No [paths].handler_command configured; rotations will fail at the mutation stage");
            Ok(Arc::new(UnconfiguredHandler))
        }
    }
}

pub fn engine(config: &RotorConfig) -> Result<RotationEngine> {
    Ok(RotationEngine::new(
        state_handler(config)?,
        Arc::new(FsBackupStore::new(config.backup_dir())),
        Arc::new(ConfiguredPaths::new(config.target_dirs())),
        Arc::new(SysinfoHost),
        EngineSettings::from_config(config),
    ))
}

pub fn watcher(config: &RotorConfig) -> Result<Watcher> {
    let watcher = Watcher::new(
        scheduler(config),
        engine(config)?,
        coordinator(config),
        Arc::new(LogNotifier::from_config(&config.notification)),
        rotation_history(config),
        RotationOptions::from_config(config),
    )
    .with_pool(account_pool(config))
    .with_poll_interval(config.service.poll_interval());
    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn isolated_config(dir: &std::path::Path) -> RotorConfig {
        let mut config = RotorConfig::default();
        config.paths.state_dir = Some(dir.to_path_buf());
        config.paths.target_dirs = vec![dir.join("ide")];
        config.paths.log_dirs = vec![dir.join("logs")];
        config
    }

    #[test]
    fn test_missing_handler_command_is_rejected() {
        let dir = tempdir().unwrap();
        let mut config = isolated_config(dir.path());
        config.paths.handler_command = Some("rotor-no-such-handler-xyz".into());
        assert!(engine(&config).is_err());
    }

    #[test]
    fn test_unconfigured_watcher_records_failed_manual_rotation() {
        let dir = tempdir().unwrap();
        let config = isolated_config(dir.path());
        let mut watcher = watcher(&config).unwrap();
        watcher.trigger_manual_rotation();

        let result = watcher.run_once().unwrap().unwrap();
        assert!(!result.success);
        assert!(config.rotation_history_file().exists());
        assert_eq!(coordinator(&config).get_state().rotation_count, 1);
    }
}
