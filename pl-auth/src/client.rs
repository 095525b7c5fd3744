//! HTTP client for the credential provider's token endpoint.
//!
//! Performs the client-credentials grant and classifies every failure as
//! `AuthenticationFailed`. A failed grant fails the current connect attempt;
//! retries are left to the reconnect policy.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use tracing::{debug, warn};

use pl_core::config::ServerConfig;
use pl_core::error::{PlError, PlResult};

use crate::response::{AccessToken, GrantRequest, TokenResponse};
use crate::store::CredentialProvider;

/// Longest slice of an error body carried into an error message.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Client-credentials token client.
///
/// Wraps reqwest::Client with the token endpoint, client credentials and
/// error classification.
#[derive(Clone)]
pub struct TokenClient {
    inner: Client,
    /// Token endpoint URL.
    auth_url: String,
    client_id: String,
    client_secret: String,
}

impl TokenClient {
    /// Create a new TokenClient from server configuration.
    pub fn new(config: &ServerConfig) -> PlResult<Self> {
        if config.auth_url.is_empty() {
            return Err(PlError::MissingConfig("server.auth_url".into()));
        }

        let inner = Client::builder()
            .timeout(Duration::from_millis(config.api_timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|e| PlError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            inner,
            auth_url: config.auth_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }

    /// Get the token endpoint URL.
    pub fn auth_url(&self) -> &str {
        &self.auth_url
    }

    /// Run the grant once and return the issued token.
    pub async fn request_token(&self) -> PlResult<AccessToken> {
        debug!("POST {}", self.auth_url);
        let body = GrantRequest::client_credentials(&self.client_id, &self.client_secret);

        let response = self
            .inner
            .post(&self.auth_url)
            .json(&body)
            .send()
            .await
            .map_err(Self::classify_error)?;

        let response = Self::check_status(response).await?;
        let parsed: TokenResponse = response.json().await.map_err(|e| {
            PlError::AuthenticationFailed(format!("unreadable token response: {e}"))
        })?;

        if parsed.access_token.is_empty() {
            return Err(PlError::AuthenticationFailed(
                "token response did not contain an access_token".into(),
            ));
        }

        Ok(AccessToken::from(parsed))
    }

    /// Convert a non-2xx response into `AuthenticationFailed`.
    async fn check_status(response: Response) -> PlResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        warn!("token endpoint returned {status}");
        Err(PlError::AuthenticationFailed(format!(
            "token endpoint returned {status}{}",
            summarize_body(&body)
        )))
    }

    /// Classify a reqwest error. Network failures still fail authentication.
    fn classify_error(e: reqwest::Error) -> PlError {
        if e.is_timeout() {
            PlError::AuthenticationFailed(format!("token request timed out: {e}"))
        } else if e.is_connect() {
            PlError::AuthenticationFailed(format!("credential provider unreachable: {e}"))
        } else {
            PlError::AuthenticationFailed(e.to_string())
        }
    }
}

#[async_trait]
impl CredentialProvider for TokenClient {
    async fn fetch_token(&self) -> PlResult<AccessToken> {
        self.request_token().await
    }
}

/// Render an error body for inclusion after a status line.
fn summarize_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let mut summary: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
    if trimmed.chars().count() > MAX_ERROR_BODY_CHARS {
        summary.push('…');
    }
    format!(": {summary}")
}
