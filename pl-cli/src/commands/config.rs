//! Config commands.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use console::style;

use pl_core::config::{AppConfig, ConfigHandle};
use pl_core::error::PlResult;

use crate::OutputFormat;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration (the client secret is masked).
    Show,
    /// Write a configuration file with default values.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print the configuration file path.
    Path,
}

fn print_config_text(cfg: &AppConfig) {
    println!("{}", style("Server").bold().underlined());
    println!("  server.auth_url                   {}", cfg.server.auth_url);
    println!("  server.socket_url                 {}", cfg.server.socket_url);
    println!("  server.client_id                  {}", cfg.server.client_id);
    println!("  server.client_secret              {}", super::mask_secret(&cfg.server.client_secret));
    println!("  server.api_timeout_ms             {}", cfg.server.api_timeout_ms);
    println!("  server.connect_timeout_ms         {}", cfg.server.connect_timeout_ms);

    println!();
    println!("{}", style("Reconnect").bold().underlined());
    println!("  reconnect.max_attempts            {}", cfg.reconnect.max_attempts);
    println!("  reconnect.base_delay_ms           {}", cfg.reconnect.base_delay_ms);

    println!();
    println!("{}", style("Dispatch").bold().underlined());
    println!("  dispatch.workers                  {}", cfg.dispatch.workers);
    println!("  dispatch.queue_capacity           {}", cfg.dispatch.queue_capacity);
    println!("  dispatch.event_channel_capacity   {}", cfg.dispatch.event_channel_capacity);

    println!();
    println!("{}", style("Subscriptions").bold().underlined());
    println!("  subscriptions.subscribe_catalogue {}", cfg.subscriptions.subscribe_catalogue);
    println!("  subscriptions.extra_events        {}", cfg.subscriptions.extra_events.join(", "));

    println!();
    println!("{}", style("Logging").bold().underlined());
    println!("  logging.level                     {}", cfg.logging.level);
    println!("  logging.directory                 {}", cfg.logging.directory);
    println!("  logging.json_output               {}", cfg.logging.json_output);
}

fn config_json(cfg: &AppConfig) -> serde_json::Value {
    serde_json::json!({
        "server": {
            "auth_url": cfg.server.auth_url,
            "socket_url": cfg.server.socket_url,
            "client_id": cfg.server.client_id,
            "client_secret": super::mask_secret(&cfg.server.client_secret),
            "api_timeout_ms": cfg.server.api_timeout_ms,
            "connect_timeout_ms": cfg.server.connect_timeout_ms,
        },
        "reconnect": {
            "max_attempts": cfg.reconnect.max_attempts,
            "base_delay_ms": cfg.reconnect.base_delay_ms,
        },
        "dispatch": {
            "workers": cfg.dispatch.workers,
            "queue_capacity": cfg.dispatch.queue_capacity,
            "event_channel_capacity": cfg.dispatch.event_channel_capacity,
        },
        "subscriptions": {
            "subscribe_catalogue": cfg.subscriptions.subscribe_catalogue,
            "extra_events": cfg.subscriptions.extra_events,
        },
        "logging": {
            "level": cfg.logging.level,
            "directory": cfg.logging.directory,
            "json_output": cfg.logging.json_output,
        },
    })
}

/// Write a default config to `path`. Returns `false` if a file was already there.
fn init_config(path: &Path, force: bool) -> PlResult<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    AppConfig::default().save_to_file(path)?;
    Ok(true)
}

pub async fn run(
    config: ConfigHandle,
    action: ConfigAction,
    path: PathBuf,
    format: OutputFormat,
) -> PlResult<()> {
    match action {
        ConfigAction::Show => {
            let cfg = config.read().await;
            match format {
                OutputFormat::Json => super::print_json(&config_json(&cfg)),
                OutputFormat::Text => {
                    print_config_text(&cfg);
                    if !cfg.is_server_configured() {
                        println!();
                        println!(
                            "{} Server section is incomplete; `pushlink listen` will refuse to start.",
                            style("WARN").yellow().bold()
                        );
                    }
                }
            }
        }
        ConfigAction::Init { force } => {
            let written = init_config(&path, force)?;
            match format {
                OutputFormat::Json => {
                    super::print_json(&serde_json::json!({
                        "path": path.display().to_string(),
                        "written": written,
                    }));
                }
                OutputFormat::Text if written => {
                    println!("{} Wrote defaults to {}", style("OK").green().bold(), path.display());
                    println!("  Fill in the [server] section before running `pushlink listen`.");
                }
                OutputFormat::Text => {
                    println!(
                        "{} {} already exists (use --force to overwrite)",
                        style("SKIP").yellow().bold(),
                        path.display()
                    );
                }
            }
        }
        ConfigAction::Path => match format {
            OutputFormat::Json => {
                super::print_json(&serde_json::json!({
                    "path": path.display().to_string(),
                    "exists": path.exists(),
                }));
            }
            OutputFormat::Text => println!("{}", path.display()),
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_json_masks_secret() {
        let mut cfg = AppConfig::default();
        cfg.server.client_secret = "very-secret".into();
        let json = config_json(&cfg);
        assert_eq!(json["server"]["client_secret"], "very****");
        assert_eq!(json["reconnect"]["max_attempts"], 5);
        assert_eq!(json["reconnect"]["base_delay_ms"], 5000);
    }

    #[test]
    fn test_init_config_respects_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        assert!(init_config(&path, false).unwrap());
        assert!(path.exists());

        std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();
        assert!(!init_config(&path, false).unwrap());
        assert_eq!(AppConfig::load_from_file(&path).unwrap().logging.level, "debug");

        assert!(init_config(&path, true).unwrap());
        assert_eq!(AppConfig::load_from_file(&path).unwrap().logging.level, "info");
    }
}
