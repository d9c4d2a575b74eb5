//! JSON state files: tolerant reads, atomic temp-file + rename writes.

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Write data to a file atomically using temp-file + rename.
pub fn atomic_write(target: &Path, data: &[u8]) -> Result<()> {
    let parent = target.parent().context("Target path has no parent")?;
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory {}", parent.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;

    std::io::Write::write_all(&mut tmp, data).context("Failed to write temp file")?;

    tmp.persist(target)
        .with_context(|| format!("Failed to persist to {}", target.display()))?;

    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json<T: Serialize>(target: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {}", target.display()))?;
    atomic_write(target, json.as_bytes())
}

/// Read a JSON file, returning `None` when it does not exist.
///
/// A leading UTF-8 BOM is ignored; files written by other tools on Windows
/// often carry one.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };
    let content = content.trim_start_matches('\u{feff}');
    if content.trim().is_empty() {
        return Ok(None);
    }
    let value = serde_json::from_str(content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}
