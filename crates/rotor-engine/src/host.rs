use anyhow::{Context, Result};
use rotor_core::collaborators::HostSystem;
use std::path::{Path, PathBuf};
use sysinfo::{Disks, ProcessesToUpdate, System};

/// Process and disk facts from `sysinfo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoHost;

/// Lowercased process name without a trailing `.exe`.
pub fn normalize_process_name(name: &str) -> String {
    let lower = name.to_lowercase();
    match lower.strip_suffix(".exe") {
        Some(stem) => stem.to_string(),
        None => lower,
    }
}

/// Closest existing ancestor of `path`, so a not-yet-created backup
/// directory still resolves to a filesystem.
fn existing_ancestor(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|p| p.exists())
        .and_then(|p| p.canonicalize().ok())
}

impl HostSystem for SysinfoHost {
    fn is_process_running(&self, names: &[String]) -> bool {
        if names.is_empty() {
            return false;
        }
        let wanted: Vec<String> = names.iter().map(|n| normalize_process_name(n)).collect();
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::All, true);
        sys.processes().values().any(|process| {
            let name = normalize_process_name(&process.name().to_string_lossy());
            wanted.contains(&name)
        })
    }

    fn free_space(&self, path: &Path) -> Result<u64> {
        let resolved = existing_ancestor(path)
            .with_context(|| format!("No existing ancestor for {}", path.display()))?;
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|disk| resolved.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
            .with_context(|| format!("No mounted filesystem found for {}", resolved.display()))
    }
}
