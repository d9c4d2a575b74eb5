use anyhow::{Result, bail};
use rotor_config::RotorConfig;
use serde_json::{Map, Value};

use crate::cli::{OutputFormat, PoolCommands};
use crate::components;

pub(crate) fn handle_pool(config: &RotorConfig, cmd: PoolCommands, format: OutputFormat) -> Result<()> {
    let pool = components::account_pool(config);
    match cmd {
        PoolCommands::Add { id, metadata } => {
            let account = pool.add(&id, parse_metadata(&metadata)?)?;
            eprintln!("Added account: {}", account.id);
        }
        PoolCommands::Remove { id } => {
            pool.remove(&id)?;
            eprintln!("Removed account: {id}");
        }
        PoolCommands::Switch { id } => {
            let account = pool.switch(id.as_deref())?;
            eprintln!("Current account: {}", account.id);
        }
        PoolCommands::Clear => {
            pool.clear()?;
            eprintln!("Account pool cleared");
        }
        PoolCommands::List => {
            let stats = pool.statistics()?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                OutputFormat::Text => {
                    if stats.accounts.is_empty() {
                        println!("No accounts in pool.");
                    }
                    for usage in &stats.accounts {
                        let marker = if stats.current_account.as_deref() == Some(usage.id.as_str()) {
                            "*"
                        } else {
                            " "
                        };
                        let last_used = usage
                            .last_used
                            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                            .unwrap_or_else(|| "never".to_string());
                        println!(
                            "{marker} {:<20} rotations: {:<5} last used: {last_used}",
                            usage.id, usage.rotation_count
                        );
                    }
                }
            }
        }
    }
    Ok(())
}

/// `key=value` pairs into a JSON object; values stay strings.
fn parse_metadata(entries: &[String]) -> Result<Map<String, Value>> {
    let mut map = Map::new();
    for entry in entries {
        let Some((key, value)) = entry.split_once('=') else {
            bail!("Invalid metadata '{entry}': expected KEY=VALUE");
        };
        map.insert(key.trim().to_string(), Value::String(value.to_string()));
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metadata() {
        let map = parse_metadata(&["email=a@b.c".into(), "plan = pro=x".into()]).unwrap();
        assert_eq!(map["email"], "a@b.c");
        assert_eq!(map["plan"], " pro=x");
        assert!(parse_metadata(&["novalue".into()]).is_err());
    }
}
