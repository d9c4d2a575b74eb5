use rotor_core::collaborators::PathResolver;
use rotor_monitor::{DATABASE_FILE, STORAGE_FILE};
use std::path::PathBuf;

/// Files inside each IDE state directory that a rotation may touch.
pub const TARGET_FILES: [&str; 2] = [STORAGE_FILE, DATABASE_FILE];

/// Fixed list of IDE state directories, usually from `[paths].target_dirs`.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredPaths {
    dirs: Vec<PathBuf>,
}

impl ConfiguredPaths {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }
}

impl PathResolver for ConfiguredPaths {
    fn target_directories(&self) -> Vec<PathBuf> {
        self.dirs.clone()
    }
}

/// Existing target files across `dirs`, in directory order.
pub fn existing_target_files(dirs: &[PathBuf]) -> Vec<PathBuf> {
    dirs.iter()
        .flat_map(|dir| TARGET_FILES.iter().map(move |name| dir.join(name)))
        .filter(|path| path.is_file())
        .collect()
}
