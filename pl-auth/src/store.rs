//! Credential store: the single holder of the current bearer token.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use pl_core::error::PlResult;

use crate::response::AccessToken;

/// Anything that can issue a bearer token.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Request a fresh token.
    async fn fetch_token(&self) -> PlResult<AccessToken>;
}

/// Holds the current bearer token.
///
/// The token is only ever replaced by [`authenticate`](Self::authenticate),
/// which holds the store's lock for the whole grant so two flows can never
/// race to overwrite it. There is no local expiry tracking.
#[derive(Clone)]
pub struct CredentialStore {
    provider: Arc<dyn CredentialProvider>,
    token: Arc<Mutex<Option<AccessToken>>>,
}

impl CredentialStore {
    /// Create an empty store backed by `provider`.
    pub fn new(provider: Arc<dyn CredentialProvider>) -> Self {
        Self {
            provider,
            token: Arc::new(Mutex::new(None)),
        }
    }

    /// Run the grant, store the returned token and return its secret.
    ///
    /// On failure the previous token is discarded as well.
    pub async fn authenticate(&self) -> PlResult<String> {
        let mut slot = self.token.lock().await;
        match self.provider.fetch_token().await {
            Ok(token) => {
                info!("authenticated, token {}", token.redacted());
                let secret = token.secret().to_string();
                *slot = Some(token);
                Ok(secret)
            }
            Err(e) => {
                warn!("authentication failed: {e}");
                *slot = None;
                Err(e)
            }
        }
    }

    /// The currently stored token, if any.
    pub async fn current(&self) -> Option<AccessToken> {
        self.token.lock().await.clone()
    }

    /// Drop the stored token after the server refused it.
    pub async fn invalidate(&self) {
        if self.token.lock().await.take().is_some() {
            debug!("stored token invalidated");
        }
    }
}
