//! PushLink CLI - Command-line client for the PushLink event stream.
//!
//! Authenticates against the credential provider, holds the event socket open
//! and prints every event it receives. Also useful for checking credentials
//! and managing the configuration file.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use pl_core::config::{AppConfig, ConfigHandle};
use pl_core::error::PlResult;
use pl_core::logging;

/// PushLink - authenticated push-event stream client.
#[derive(Parser)]
#[command(
    name = "pushlink",
    version,
    about = "PushLink event stream client",
    long_about = "A command-line client for an authenticated push-event stream.\n\
                   Connects with client credentials, declares the event catalogue and \
                   prints events as they arrive, reconnecting when the connection drops."
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
    /// Connect and print events until Ctrl+C.
    Listen {
        /// Additional event name to subscribe to (repeatable).
        #[arg(short, long = "event", value_name = "NAME")]
        events: Vec<String>,
        /// Do not declare the built-in event catalogue.
        #[arg(long)]
        no_catalogue: bool,
    },
    /// Request a bearer token once and report the result.
    Auth,
    /// List the built-in event catalogue.
    Events,
    /// Manage the configuration file.
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

#[tokio::main]
async fn main() -> PlResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let (config, config_path) = match cli.config.clone() {
        Some(path) => (AppConfig::load_from_file(&path)?, path),
        None => (AppConfig::load_default()?, AppConfig::default_config_path()?),
    };

    // Initialize logging
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    let log_dir = config
        .effective_log_dir()
        .unwrap_or_else(|_| PathBuf::from("logs"));
    let _guard = match logging::init_logging(&log_level, &log_dir, config.logging.json_output) {
        Ok(guard) => Some(guard),
        Err(e) => {
            logging::init_console_logging(&log_level);
            warn!("file logging disabled: {e}");
            None
        }
    };

    let config_handle = ConfigHandle::new(config);

    info!(
        "PushLink CLI v{} on {}",
        pl_core::constants::APP_VERSION,
        std::env::consts::OS
    );

    // Dispatch to command handlers
    match cli.command {
        Commands::Listen { events, no_catalogue } => {
            commands::listen::run(config_handle, events, no_catalogue, cli.format).await
        }
        Commands::Auth => commands::auth::run(config_handle, cli.format).await,
        Commands::Events => commands::events::run(cli.format).await,
        Commands::Config { action } => {
            commands::config::run(config_handle, action, config_path, cli.format).await
        }
    }
}
