//! Token grant request and response types.
//!
//! The credential provider speaks the OAuth client-credentials grant:
//! ```json
//! { "client_id": "...", "client_secret": "...", "grant_type": "client_credentials" }
//! ```
//! and answers with
//! ```json
//! { "access_token": "...", "token_type": "Bearer", "expires_in": 3600 }
//! ```

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pl_core::constants::CLIENT_CREDENTIALS_GRANT;

/// JSON body posted to the token endpoint.
#[derive(Clone, Serialize)]
pub struct GrantRequest<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub grant_type: &'static str,
}

impl<'a> GrantRequest<'a> {
    /// Build a client-credentials grant.
    pub fn client_credentials(client_id: &'a str, client_secret: &'a str) -> Self {
        Self {
            client_id,
            client_secret,
            grant_type: CLIENT_CREDENTIALS_GRANT,
        }
    }
}

/// Successful token endpoint response. Unknown fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The bearer token.
    #[serde(default)]
    pub access_token: String,
    /// Token type, normally "Bearer".
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime in seconds, if the provider reports one.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Granted scopes.
    #[serde(default)]
    pub scope: Option<String>,
}

/// A bearer token held by the credential store.
#[derive(Clone)]
pub struct AccessToken {
    value: String,
    /// Token type reported by the provider.
    pub token_type: String,
    /// Reported lifetime. Informational only: the token is used until a
    /// handshake with it fails.
    pub expires_in: Option<Duration>,
    /// When the token was received.
    pub obtained_at: DateTime<Utc>,
}

impl AccessToken {
    /// Create a bearer token obtained now.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            token_type: "Bearer".to_string(),
            expires_in: None,
            obtained_at: Utc::now(),
        }
    }

    /// The raw secret, for the `Authorization` header.
    pub fn secret(&self) -> &str {
        &self.value
    }

    /// Short, log-safe prefix of the token.
    pub fn redacted(&self) -> String {
        let prefix: String = self.value.chars().take(6).collect();
        format!("{prefix}…")
    }
}

impl From<TokenResponse> for AccessToken {
    fn from(resp: TokenResponse) -> Self {
        Self {
            value: resp.access_token,
            token_type: resp.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_in: resp.expires_in.map(Duration::from_secs),
            obtained_at: Utc::now(),
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &self.redacted())
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}
