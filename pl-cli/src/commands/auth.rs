//! Auth command - run the client-credentials grant once and report.

use std::time::Instant;

use console::style;

use pl_auth::TokenClient;
use pl_core::config::ConfigHandle;
use pl_core::error::{PlError, PlResult};

use crate::OutputFormat;

/// Run the auth command.
pub async fn run(config: ConfigHandle, format: OutputFormat) -> PlResult<()> {
    super::ensure_client_secret(&config).await?;
    let server = config.read().await.server.clone();
    if server.client_id.is_empty() {
        return Err(PlError::MissingConfig("server.client_id".into()));
    }
    if server.client_secret.is_empty() {
        return Err(PlError::MissingConfig("server.client_secret".into()));
    }

    let client = TokenClient::new(&server)?;
    if format == OutputFormat::Text {
        println!("Requesting token from {}...", client.auth_url());
    }

    let started = Instant::now();
    let result = client.request_token().await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match (result, format) {
        (Ok(token), OutputFormat::Json) => {
            super::print_json(&serde_json::json!({
                "ok": true,
                "auth_url": client.auth_url(),
                "token": token.redacted(),
                "token_type": token.token_type,
                "expires_in": token.expires_in.map(|d| d.as_secs()),
                "obtained_at": token.obtained_at.to_rfc3339(),
                "elapsed_ms": elapsed_ms,
            }));
            Ok(())
        }
        (Ok(token), OutputFormat::Text) => {
            println!("  {} Token issued in {elapsed_ms}ms.", style("OK").green().bold());
            println!("  Token:      {}", token.redacted());
            println!("  Type:       {}", token.token_type);
            match token.expires_in {
                Some(lifetime) => {
                    let expiry = token.obtained_at
                        + chrono::Duration::seconds(lifetime.as_secs() as i64);
                    println!(
                        "  Expires:    in {}s ({})",
                        lifetime.as_secs(),
                        expiry.format("%Y-%m-%d %H:%M:%S UTC")
                    );
                }
                None => println!("  Expires:    {}", style("not reported").dim()),
            }
            Ok(())
        }
        (Err(e), OutputFormat::Json) => {
            super::print_json(&serde_json::json!({
                "ok": false,
                "auth_url": client.auth_url(),
                "error": e.to_string(),
                "elapsed_ms": elapsed_ms,
            }));
            Err(e)
        }
        (Err(e), OutputFormat::Text) => {
            println!("  {} {e}", style("FAIL").red().bold());
            Err(e)
        }
    }
}
