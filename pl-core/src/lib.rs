//! PushLink Core - Foundation types, error handling, configuration, and logging.
//!
//! This crate provides the shared foundation used by the other PushLink crates:
//! - Application configuration (endpoints, client credentials, reconnect tuning)
//! - The error taxonomy shared by authentication, transport and dispatch
//! - Structured logging with tracing
//! - Per-user config and data directories
//! - Common constants

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod platform;

// Re-export commonly used items at the crate root
pub use config::{AppConfig, ConfigHandle};
pub use error::{PlError, PlResult};
pub use logging::init_logging;
