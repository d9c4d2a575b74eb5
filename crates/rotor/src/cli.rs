use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rotor")]
#[command(about = "Automatic IDE identifier rotation driven by token, rate-limit and schedule triggers")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to <config_dir>/rotor/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, default_value = "text", global = true)]
    pub format: OutputFormat,
}

/// Output format for CLI responses
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the polling watcher until interrupted
    Watch {
        /// Override [service].poll_interval_seconds
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Evaluate triggers once and rotate if one fires (scheduled-task entry point)
    RunOnce {
        /// Rotate now regardless of other triggers
        #[arg(long)]
        manual: bool,
    },

    /// Show coordinator state, scheduler status and monitor results
    Status,

    /// Ask the running watcher to rotate on its next pass
    Trigger,

    /// Inspect or manage rotation and API history
    History {
        #[command(subcommand)]
        cmd: HistoryCommands,
    },

    /// Manage the account pool
    Pool {
        #[command(subcommand)]
        cmd: PoolCommands,
    },

    /// Show or initialise configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum HistoryCommands {
    /// Rotation statistics over a window of days
    Stats {
        #[arg(long, default_value_t = 30)]
        days: i64,
    },

    /// Most recent rotations
    Recent {
        #[arg(long, default_value_t = 10)]
        count: usize,
    },

    /// API call statistics over a window of hours
    Api {
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },

    /// Export history to a file
    Export {
        output: PathBuf,

        /// json or csv
        #[arg(long, default_value = "json")]
        format: String,

        /// Export API history instead of rotation history
        #[arg(long)]
        api: bool,
    },

    /// Delete all recorded history
    Clear {
        /// Clear API history instead of rotation history
        #[arg(long)]
        api: bool,
    },
}

#[derive(Subcommand)]
pub enum PoolCommands {
    /// Add an account; the first one added becomes current
    Add {
        id: String,

        /// Metadata entries as key=value
        #[arg(long = "meta", value_name = "KEY=VALUE")]
        metadata: Vec<String>,
    },

    /// Remove an account
    Remove { id: String },

    /// List accounts and usage
    List,

    /// Switch to the given account, or to the next one
    Switch { id: Option<String> },

    /// Remove every account
    Clear,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write a commented config template
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,

    /// Print the config file location
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_watch_interval() {
        let cli = Cli::try_parse_from(["rotor", "watch", "--interval", "5"]).unwrap();
        assert!(matches!(cli.command, Commands::Watch { interval: Some(5) }));
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["rotor", "status", "--format", "json", "--config", "/tmp/r.toml"])
            .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/r.toml")));
    }

    #[test]
    fn test_parse_pool_metadata() {
        let cli = Cli::try_parse_from(["rotor", "pool", "add", "work", "--meta", "email=a@b.c"]).unwrap();
        match cli.command {
            Commands::Pool {
                cmd: PoolCommands::Add { id, metadata },
            } => {
                assert_eq!(id, "work");
                assert_eq!(metadata, vec!["email=a@b.c"]);
            }
            _ => panic!("expected pool add"),
        }
    }

    #[test]
    fn test_switch_id_optional() {
        let cli = Cli::try_parse_from(["rotor", "pool", "switch"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Pool {
                cmd: PoolCommands::Switch { id: None }
            }
        ));
    }
}
