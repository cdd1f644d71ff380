//! Courier CLI - operator tool for the message sync core.
//!
//! Watches a chat through the same sync service an application embeds,
//! probes the backend endpoints one call at a time, and manages the
//! configuration file.

mod commands;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use courier_core::config::AppConfig;
use courier_core::error::CourierResult;
use courier_core::logging;

/// Courier - mirrored chat sync from the terminal.
#[derive(Parser)]
#[command(
    name = "courier",
    version,
    about = "Courier message sync CLI",
    long_about = "A command-line interface for the Courier sync core.\n\
                   Watch a mirrored chat live, fetch a page, or trigger an upstream sync."
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json).
    #[arg(short = 'f', long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output for scripting.
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep the chat in sync and print connection changes and new messages
    /// until Ctrl-C.
    Watch {
        /// Messages to show from the initial snapshot.
        #[arg(short = 'n', long, default_value = "20")]
        backlog: usize,
    },
    /// Fetch one page of messages and print it.
    Fetch {
        /// Only messages after this cursor.
        #[arg(long)]
        after: Option<String>,
        /// Page size (overrides config).
        #[arg(short = 'n', long)]
        limit: Option<u32>,
    },
    /// Ask the backend to sync from its upstream source.
    Trigger,
    /// Show or create the configuration file.
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

#[tokio::main]
async fn main() -> CourierResult<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => AppConfig::default_config_path().unwrap_or_else(|_| PathBuf::from("config.toml")),
    };
    let config = load_config(&config_path, cli.config.is_some())?;

    let log_level = if cli.verbose { "debug" } else { config.logging.level.as_str() };
    let _guard = match config
        .effective_log_dir()
        .and_then(|dir| logging::init_logging(log_level, &dir, config.logging.json_output))
    {
        Ok(guard) => Some(guard),
        Err(e) => {
            logging::init_console_logging(log_level);
            warn!("file logging unavailable, logging to console only: {e}");
            None
        }
    };

    info!("Courier CLI v{}", courier_core::constants::APP_VERSION);

    match cli.command {
        Commands::Watch { backlog } => commands::watch::run(&config, backlog, cli.format).await,
        Commands::Fetch { after, limit } => {
            commands::fetch::run(&config, after, limit, cli.format).await
        }
        Commands::Trigger => commands::trigger::run(&config, cli.format).await,
        Commands::Config { action } => {
            commands::config::run(&config, &config_path, action, cli.format)
        }
    }
}

/// An explicitly named file must exist; the default one is optional.
fn load_config(path: &Path, explicit: bool) -> CourierResult<AppConfig> {
    if explicit || path.exists() {
        AppConfig::load_from_file(path)
    } else {
        Ok(AppConfig::default())
    }
}
