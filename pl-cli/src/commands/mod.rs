//! CLI command implementations.

pub mod auth;
pub mod config;
pub mod events;
pub mod listen;

use dialoguer::Password;

use pl_core::config::ConfigHandle;
use pl_core::error::{PlError, PlResult};

/// Prompt for the client secret when the config file leaves it empty.
///
/// The secret is kept in memory only. Without a terminal the config is left
/// untouched and validation reports the missing value.
pub async fn ensure_client_secret(config: &ConfigHandle) -> PlResult<()> {
    if !config.read().await.server.client_secret.is_empty() {
        return Ok(());
    }
    if !console::Term::stderr().is_term() {
        return Ok(());
    }

    let secret = Password::new()
        .with_prompt("Client secret")
        .interact()
        .map_err(|e| PlError::Internal(e.to_string()))?;
    config.write().await.server.client_secret = secret;
    Ok(())
}

/// Print a JSON value in pretty form.
pub fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

/// Mask a secret for display, keeping at most the first four characters.
pub fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        return "(not set)".to_string();
    }
    let visible: String = secret.chars().take(4).collect();
    format!("{visible}****")
}

/// Truncate a string to a maximum length, appending an ellipsis if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len > 3 {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    } else {
        s.chars().take(max_len).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret(""), "(not set)");
        assert_eq!(mask_secret("ab"), "ab****");
        assert_eq!(mask_secret("s3cr3t-value"), "s3cr****");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer payload", 10), "a much ...");
        assert_eq!(truncate("abcdef", 2), "ab");
        assert_eq!(truncate("héllo wörld", 8), "héllo...");
    }
}
