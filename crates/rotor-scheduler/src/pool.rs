//! Bounded account pool with round-robin switching.
//!
//! State lives in `account_pool.json`; every mutation is a read-modify-write
//! under the sibling `.lock` file so the CLI and the watcher can share it.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rotor_core::AppError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub const DEFAULT_MAX_ACCOUNTS: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub added_at: DateTime<Utc>,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rotation_count: u64,
}

/// On-disk shape. `accounts` is a list so insertion order survives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct PoolFile {
    accounts: Vec<Account>,
    current_account: Option<String>,
    last_updated: Option<DateTime<Utc>>,
}

impl PoolFile {
    fn position(&self, id: &str) -> Option<usize> {
        self.accounts.iter().position(|a| a.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Account> {
        self.accounts.iter_mut().find(|a| a.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountUsage {
    pub id: String,
    pub rotation_count: u64,
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStats {
    pub total_accounts: usize,
    pub current_account: Option<String>,
    pub total_rotations: u64,
    pub accounts: Vec<AccountUsage>,
}

pub struct AccountPool {
    path: PathBuf,
    max_accounts: usize,
    lock_timeout: Duration,
}

impl AccountPool {
    pub fn new(path: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            max_accounts: DEFAULT_MAX_ACCOUNTS,
            lock_timeout,
        }
    }

    pub fn with_max_accounts(mut self, max: usize) -> Self {
        self.max_accounts = max;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<PoolFile> {
        Ok(rotor_lock::state_file::read_json(&self.path)?.unwrap_or_default())
    }

    fn update<T>(&self, f: impl FnOnce(&mut PoolFile) -> Result<T>) -> Result<T> {
        let lock_path = rotor_lock::lock_path_for(&self.path);
        let result = rotor_lock::with_lock(&lock_path, "account-pool", self.lock_timeout, || {
            let mut pool = self.load()?;
            let value = f(&mut pool)?;
            pool.last_updated = Some(Utc::now());
            rotor_lock::state_file::write_json(&self.path, &pool)?;
            Ok(value)
        })?;
        result.ok_or_else(|| {
            AppError::LockTimeout {
                path: lock_path.display().to_string(),
                timeout_ms: self.lock_timeout.as_millis() as u64,
            }
            .into()
        })
    }

    /// Add an account; the first one added becomes current.
    pub fn add(
        &self,
        id: &str,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Account> {
        let max = self.max_accounts;
        let account = self.update(|pool| {
            if pool.accounts.len() >= max {
                return Err(AppError::PoolFull { max }.into());
            }
            if pool.position(id).is_some() {
                return Err(AppError::AccountExists(id.to_string()).into());
            }
            let account = Account {
                id: id.to_string(),
                metadata,
                added_at: Utc::now(),
                last_used: None,
                rotation_count: 0,
            };
            pool.accounts.push(account.clone());
            if pool.current_account.is_none() {
                pool.current_account = Some(id.to_string());
            }
            Ok(account)
        })?;
        info!(account = %id, "Account added");
        Ok(account)
    }

    /// Remove an account. If it was current, the first remaining one takes over.
    pub fn remove(&self, id: &str) -> Result<()> {
        self.update(|pool| {
            let idx = pool
                .position(id)
                .ok_or_else(|| AppError::AccountNotFound(id.to_string()))?;
            pool.accounts.remove(idx);
            if pool.current_account.as_deref() == Some(id) {
                pool.current_account = pool.accounts.first().map(|a| a.id.clone());
            }
            Ok(())
        })?;
        info!(account = %id, "Account removed");
        Ok(())
    }

    pub fn current(&self) -> Result<Option<Account>> {
        let pool = self.load()?;
        Ok(pool
            .current_account
            .as_deref()
            .and_then(|id| pool.accounts.iter().find(|a| a.id == id))
            .cloned())
    }

    pub fn accounts(&self) -> Result<Vec<Account>> {
        Ok(self.load()?.accounts)
    }

    /// Switch to `target`, or to the next account in insertion order when
    /// `None`.
    pub fn switch(&self, target: Option<&str>) -> Result<Account> {
        let account = self.update(|pool| {
            if pool.accounts.is_empty() {
                return Err(AppError::PoolRotation("no accounts in pool".into()).into());
            }
            let id = match target {
                Some(id) => id.to_string(),
                None => {
                    if pool.accounts.len() == 1 {
                        return Err(AppError::PoolRotation("only one account in pool".into()).into());
                    }
                    let current = pool
                        .current_account
                        .as_deref()
                        .and_then(|c| pool.position(c))
                        .unwrap_or(0);
                    pool.accounts[(current + 1) % pool.accounts.len()].id.clone()
                }
            };
            let account = pool
                .get_mut(&id)
                .ok_or_else(|| AppError::AccountNotFound(id.clone()))?;
            account.last_used = Some(Utc::now());
            let account = account.clone();
            pool.current_account = Some(id);
            Ok(account)
        })?;
        info!(account = %account.id, "Switched account");
        Ok(account)
    }

    /// Count a rotation against `id`, or the current account when `None`.
    /// Unknown ids are ignored.
    pub fn record_rotation(&self, id: Option<&str>) -> Result<()> {
        self.update(|pool| {
            let Some(id) = id.map(str::to_string).or_else(|| pool.current_account.clone()) else {
                return Ok(());
            };
            if let Some(account) = pool.get_mut(&id) {
                account.rotation_count += 1;
                account.last_used = Some(Utc::now());
            }
            Ok(())
        })
    }

    pub fn statistics(&self) -> Result<PoolStats> {
        let pool = self.load()?;
        Ok(PoolStats {
            total_accounts: pool.accounts.len(),
            current_account: pool.current_account.clone(),
            total_rotations: pool.accounts.iter().map(|a| a.rotation_count).sum(),
            accounts: pool
                .accounts
                .iter()
                .map(|a| AccountUsage {
                    id: a.id.clone(),
                    rotation_count: a.rotation_count,
                    last_used: a.last_used,
                })
                .collect(),
        })
    }

    pub fn clear(&self) -> Result<()> {
        self.update(|pool| {
            pool.accounts.clear();
            pool.current_account = None;
            Ok(())
        })?;
        info!("Account pool cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn pool(dir: &Path) -> AccountPool {
        AccountPool::new(dir.join("account_pool.json"), Duration::from_secs(1))
    }

    fn err_of<T: std::fmt::Debug>(result: Result<T>) -> AppError {
        result.unwrap_err().downcast::<AppError>().unwrap()
    }

    #[test]
    fn test_first_account_becomes_current() {
        let dir = tempdir().unwrap();
        let pool = pool(dir.path());
        pool.add("alice", Default::default()).unwrap();
        pool.add("bob", Default::default()).unwrap();
        assert_eq!(pool.current().unwrap().unwrap().id, "alice");
    }

    #[test]
    fn test_pool_is_bounded_and_rejects_duplicates() {
        let dir = tempdir().unwrap();
        let pool = pool(dir.path());
        pool.add("alice", Default::default()).unwrap();
        assert!(matches!(
            err_of(pool.add("alice", Default::default())),
            AppError::AccountExists(_)
        ));
        pool.add("bob", Default::default()).unwrap();
        assert!(matches!(
            err_of(pool.add("carol", Default::default())),
            AppError::PoolFull { max: 2 }
        ));
    }

    #[test]
    fn test_round_robin_switch() {
        let dir = tempdir().unwrap();
        let pool = pool(dir.path());
        pool.add("alice", Default::default()).unwrap();
        assert!(matches!(err_of(pool.switch(None)), AppError::PoolRotation(_)));

        pool.add("bob", Default::default()).unwrap();
        assert_eq!(pool.switch(None).unwrap().id, "bob");
        assert_eq!(pool.switch(None).unwrap().id, "alice");
        assert_eq!(pool.switch(Some("bob")).unwrap().id, "bob");
        assert!(matches!(
            err_of(pool.switch(Some("zed"))),
            AppError::AccountNotFound(_)
        ));
        assert!(pool.current().unwrap().unwrap().last_used.is_some());
    }

    #[test]
    fn test_remove_current_moves_to_first_remaining() {
        let dir = tempdir().unwrap();
        let pool = pool(dir.path());
        pool.add("alice", Default::default()).unwrap();
        pool.add("bob", Default::default()).unwrap();
        pool.remove("alice").unwrap();
        assert_eq!(pool.current().unwrap().unwrap().id, "bob");
        pool.remove("bob").unwrap();
        assert!(pool.current().unwrap().is_none());
        assert!(matches!(err_of(pool.remove("bob")), AppError::AccountNotFound(_)));
    }

    #[test]
    fn test_record_rotation_and_statistics() {
        let dir = tempdir().unwrap();
        let pool = pool(dir.path());
        pool.add("alice", Default::default()).unwrap();
        pool.add("bob", Default::default()).unwrap();
        pool.record_rotation(None).unwrap();
        pool.record_rotation(Some("bob")).unwrap();
        pool.record_rotation(Some("bob")).unwrap();
        pool.record_rotation(Some("ghost")).unwrap();

        let stats = pool.statistics().unwrap();
        assert_eq!(stats.total_accounts, 2);
        assert_eq!(stats.total_rotations, 3);
        assert_eq!(stats.accounts[0].id, "alice", "insertion order preserved");
        assert_eq!(stats.accounts[1].rotation_count, 2);
    }

    #[test]
    fn test_file_shape_and_clear() {
        let dir = tempdir().unwrap();
        let pool = pool(dir.path());
        pool.add("alice", Default::default()).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(pool.path()).unwrap()).unwrap();
        assert_eq!(json["current_account"], "alice");
        assert_eq!(json["accounts"][0]["id"], "alice");
        assert!(json["last_updated"].is_string());

        pool.clear().unwrap();
        assert!(pool.accounts().unwrap().is_empty());
        assert!(pool.current().unwrap().is_none());
    }
}
