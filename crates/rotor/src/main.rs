use anyhow::Result;
use clap::Parser;
use rotor_config::RotorConfig;

mod cli;
mod components;
mod config_cmds;
mod history_cmds;
mod logging;
mod pool_cmds;
mod service_cmds;

use cli::{Cli, Commands, ConfigCommands, HistoryCommands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(RotorConfig::config_path);

    // `config init` must work even when the existing file does not parse.
    let config = match (&cli.command, &config_path) {
        (
            Commands::Config {
                cmd: ConfigCommands::Init { .. },
            },
            _,
        )
        | (_, None) => RotorConfig::default(),
        (_, Some(path)) => RotorConfig::load_from(path)?,
    };

    // The watcher also logs to a daily file; keep the guard alive until exit.
    let _log_guard = match cli.command {
        Commands::Watch { .. } => Some(logging::init_with_file(&config.log_dir())?),
        _ => {
            logging::init_stderr();
            None
        }
    };

    let format = cli.format;
    match cli.command {
        Commands::Watch { interval } => service_cmds::handle_watch(config, interval).await,
        Commands::RunOnce { manual } => service_cmds::handle_run_once(config, manual, format).await,
        Commands::Status => service_cmds::handle_status(&config, format),
        Commands::Trigger => service_cmds::handle_trigger(&config),
        Commands::History { cmd } => match cmd {
            HistoryCommands::Stats { days } => history_cmds::handle_stats(&config, days, format),
            HistoryCommands::Recent { count } => history_cmds::handle_recent(&config, count, format),
            HistoryCommands::Api { hours } => history_cmds::handle_api(&config, hours, format),
            HistoryCommands::Export {
                output,
                format: export_format,
                api,
            } => history_cmds::handle_export(&config, &output, &export_format, api),
            HistoryCommands::Clear { api } => history_cmds::handle_clear(&config, api),
        },
        Commands::Pool { cmd } => pool_cmds::handle_pool(&config, cmd, format),
        Commands::Config { cmd } => match cmd {
            ConfigCommands::Init { force } => match &config_path {
                Some(path) => config_cmds::handle_config_init(path, force),
                None => anyhow::bail!("No config directory available; pass --config <path>"),
            },
            ConfigCommands::Show => config_cmds::handle_config_show(&config, format),
            ConfigCommands::Path => {
                match &config_path {
                    Some(path) => println!("{}", path.display()),
                    None => println!("(none)"),
                }
                Ok(())
            }
        },
    }
}
