use anyhow::{Context, Result, bail};
use rotor_config::RotorConfig;
use std::path::Path;

use crate::cli::OutputFormat;

pub(crate) fn handle_config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, RotorConfig::template())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    eprintln!("Wrote config template to: {}", path.display());
    Ok(())
}

pub(crate) fn handle_config_show(config: &RotorConfig, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => print!("{}", toml::to_string_pretty(config)?),
    }
    Ok(())
}
