//! File snapshots under `<state_dir>/backups`.
//!
//! Backup names are `<file name>.<path hash>.<timestamp>.backup`; the hash
//! keeps `storage.json` from two IDE families apart in one directory.

use anyhow::{Context, Result};
use chrono::Utc;
use rotor_core::collaborators::BackupStore;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct FsBackupStore {
    dir: PathBuf,
}

impl FsBackupStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn backup_name(original: &Path) -> String {
        let digest = Sha256::digest(original.to_string_lossy().as_bytes());
        let short: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();
        let file_name = original
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        format!(
            "{file_name}.{short}.{}.backup",
            Utc::now().format("%Y%m%d_%H%M%S_%6f")
        )
    }
}

impl BackupStore for FsBackupStore {
    fn backup_dir(&self) -> &Path {
        &self.dir
    }

    fn create_file_backup(&self, path: &Path) -> Result<Option<PathBuf>> {
        if !path.is_file() {
            return Ok(None);
        }
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create backup directory {}", self.dir.display()))?;
        let target = self.dir.join(Self::backup_name(path));
        fs::copy(path, &target).with_context(|| {
            format!("Failed to back up {} to {}", path.display(), target.display())
        })?;
        debug!(original = %path.display(), backup = %target.display(), "File backed up");
        Ok(Some(target))
    }

    /// Copy `backup` over `original`, clearing a read-only bit left by file
    /// locking first.
    fn restore_file_backup(&self, backup: &Path, original: &Path) -> Result<()> {
        if let Ok(meta) = fs::metadata(original)
            && meta.permissions().readonly()
        {
            let mut perms = meta.permissions();
            #[allow(clippy::permissions_set_readonly_false)]
            perms.set_readonly(false);
            fs::set_permissions(original, perms)
                .with_context(|| format!("Failed to unlock {}", original.display()))?;
        }
        fs::copy(backup, original).with_context(|| {
            format!("Failed to restore {} from {}", original.display(), backup.display())
        })?;
        debug!(original = %original.display(), backup = %backup.display(), "File restored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_backup_then_restore() {
        let dir = tempdir().unwrap();
        let original = dir.path().join("storage.json");
        fs::write(&original, r#"{"telemetry.machineId":"old"}"#).unwrap();

        let store = FsBackupStore::new(dir.path().join("backups"));
        let backup = store.create_file_backup(&original).unwrap().unwrap();
        assert!(backup.starts_with(store.backup_dir()));
        assert!(backup.to_string_lossy().ends_with(".backup"));

        fs::write(&original, r#"{"telemetry.machineId":"new"}"#).unwrap();
        let mut perms = fs::metadata(&original).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&original, perms).unwrap();

        store.restore_file_backup(&backup, &original).unwrap();
        assert_eq!(
            fs::read_to_string(&original).unwrap(),
            r#"{"telemetry.machineId":"old"}"#
        );
    }

    #[test]
    fn test_missing_file_is_not_backed_up() {
        let dir = tempdir().unwrap();
        let store = FsBackupStore::new(dir.path().join("backups"));
        assert!(store
            .create_file_backup(&dir.path().join("absent.json"))
            .unwrap()
            .is_none());
        assert!(!store.backup_dir().exists());
    }

    #[test]
    fn test_same_name_different_dirs_do_not_collide() {
        let a = FsBackupStore::backup_name(Path::new("/home/u/.config/Cursor/storage.json"));
        let b = FsBackupStore::backup_name(Path::new("/home/u/.config/Code/storage.json"));
        assert_ne!(a.split('.').nth(2), b.split('.').nth(2));
    }
}
