use std::path::PathBuf;

/// XDG app name used for config and state directories.
pub const APP_NAME: &str = "rotor";

pub const SERVICE_STATE_FILE: &str = "service_state.json";
pub const ROTATION_HISTORY_FILE: &str = "rotation_history.json";
pub const API_HISTORY_FILE: &str = "api_history.json";
pub const ACCOUNT_POOL_FILE: &str = "account_pool.json";
pub const BACKUP_DIR: &str = "backups";
pub const LOG_DIR: &str = "logs";

/// IDE families whose state rotor knows how to locate.
pub const IDE_FAMILIES: [&str; 2] = ["Cursor", "Code"];

/// Config directory (`~/.config/rotor` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// State directory for coordinator, history and backup files.
///
/// Prefers the XDG state dir, falling back to the local data dir, and to a
/// temp-dir location when no home directory is known (containers).
pub fn state_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| {
            dirs.state_dir()
                .unwrap_or_else(|| dirs.data_local_dir())
                .to_path_buf()
        })
        .unwrap_or_else(|| std::env::temp_dir().join(format!("{APP_NAME}-state")))
}

/// `User/globalStorage` directories of the known IDE families.
pub fn default_target_dirs() -> Vec<PathBuf> {
    let Some(base) = directories::BaseDirs::new() else {
        return Vec::new();
    };
    IDE_FAMILIES
        .iter()
        .map(|family| base.config_dir().join(family).join("User").join("globalStorage"))
        .collect()
}

/// Log directories of the known IDE families.
pub fn default_log_dirs() -> Vec<PathBuf> {
    let Some(base) = directories::BaseDirs::new() else {
        return Vec::new();
    };
    IDE_FAMILIES
        .iter()
        .map(|family| base.config_dir().join(family).join("logs"))
        .collect()
}
