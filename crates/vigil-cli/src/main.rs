//! Vigil CLI
//!
//! Command-line interface for the Vigil group moderation bot

mod logging;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use vigil_config::Config;
use vigil_core::Runtime;

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Telegram group moderation bot", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot in the foreground
    Run,

    /// Configuration helpers
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the config file path in use
    Path,

    /// Print an annotated example config
    Example,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            let config = load_config(cli.config)?;
            let data_dir = get_data_dir(&config);
            std::fs::create_dir_all(&data_dir)?;

            let log_dir = data_dir.join("logs");
            let log_level = config
                .core
                .log_level
                .clone()
                .unwrap_or_else(|| cli.log_level.clone());
            let _logging_guard = logging::init_logging(&log_dir, &log_level)?;

            info!("Starting Vigil");
            let runtime = Runtime::new(config, data_dir);
            runtime.run().await?;
        }

        Commands::Config { action } => match action {
            ConfigCommands::Path => {
                println!("{}", config_path_for_diagnostics(cli.config).display());
            }
            ConfigCommands::Example => {
                print!("{}", Config::example_toml());
            }
        },
    }

    Ok(())
}

fn load_config(config_path: Option<String>) -> Result<Config> {
    if let Some(path) = config_path {
        Ok(Config::load(&path)?)
    } else if let Some(default_path) = Config::default_path() {
        Ok(Config::load(&default_path)?)
    } else {
        anyhow::bail!("No config file found")
    }
}

fn config_path_for_diagnostics(config_path: Option<String>) -> PathBuf {
    if let Some(path) = config_path {
        PathBuf::from(path)
    } else {
        Config::default_path().unwrap_or_else(|| PathBuf::from("~/.config/vigil/config.toml"))
    }
}

fn get_data_dir(config: &Config) -> PathBuf {
    if let Some(data_dir) = &config.core.data_dir {
        if data_dir == "~" || data_dir.starts_with("~/") {
            let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
            if data_dir == "~" {
                home
            } else {
                home.join(data_dir.trim_start_matches("~/"))
            }
        } else {
            PathBuf::from(data_dir)
        }
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".vigil")
    }
}
