//! Error types for the PushLink client.
//!
//! Every failure category in the client is unified into a single `PlError`
//! enum with conversions from the underlying library errors. The first group
//! of variants mirrors the failure taxonomy of the event stream itself.

use thiserror::Error;

/// Convenience type alias for Results using PlError.
pub type PlResult<T> = Result<T, PlError>;

/// Unified error type covering all error categories in PushLink.
#[derive(Error, Debug)]
pub enum PlError {
    // -- Stream taxonomy --
    /// The credential provider refused the grant or could not be reached.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Socket-level failure: handshake refused, I/O error, lost connection.
    #[error("transport error: {0}")]
    Transport(String),

    /// An inbound frame could not be parsed.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A consumer handler returned an error or panicked.
    #[error("handler for '{event}' failed: {message}")]
    HandlerFailure {
        /// Event name the handler was registered under.
        event: String,
        /// Error text reported by the handler.
        message: String,
    },

    /// Automatic reconnection gave up.
    #[error("reconnect attempts exhausted after {attempts} attempt(s)")]
    ReconnectExhausted {
        /// Number of attempts that were made.
        attempts: u32,
    },

    // -- Configuration errors --
    /// Failed to load or parse application configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required configuration value is missing.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    // -- Network errors --
    /// HTTP request failed outside of the token grant.
    #[error("http error: {0}")]
    Http(String),

    /// The operation was abandoned because the client was shut down.
    #[error("cancelled: {0}")]
    Cancelled(String),

    // -- File/IO errors --
    /// File system operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    // -- Generic --
    /// An unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PlError {
    /// Whether a later connection attempt could plausibly succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed(_)
                | Self::Transport(_)
                | Self::Http(_)
        )
    }

    /// Whether this error came from the credential provider.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailed(_))
    }
}

impl From<serde_json::Error> for PlError {
    fn from(e: serde_json::Error) -> Self {
        PlError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for PlError {
    fn from(e: toml::de::Error) -> Self {
        PlError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlError::Config("bad value".to_string());
        assert_eq!(err.to_string(), "configuration error: bad value");

        let err = PlError::HandlerFailure {
            event: "chat.message".into(),
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "handler for 'chat.message' failed: boom");

        let err = PlError::ReconnectExhausted { attempts: 5 };
        assert_eq!(
            err.to_string(),
            "reconnect attempts exhausted after 5 attempt(s)"
        );
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(PlError::AuthenticationFailed("401".into()).is_recoverable());
        assert!(PlError::Transport("reset".into()).is_recoverable());
        assert!(PlError::Http("502".into()).is_recoverable());
        assert!(!PlError::Cancelled("shutdown".into()).is_recoverable());
        assert!(!PlError::Internal("worker gone".into()).is_recoverable());
        assert!(!PlError::ReconnectExhausted { attempts: 5 }.is_recoverable());
        assert!(!PlError::MissingConfig("client_id".into()).is_recoverable());
        assert!(!PlError::MalformedFrame("eof".into()).is_recoverable());
    }

    #[test]
    fn test_from_serde_json() {
        let err: PlError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, PlError::Serialization(_)));
    }
}
