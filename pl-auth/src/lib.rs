//! PushLink Auth - bearer token acquisition for the event socket.
//!
//! This crate provides the credential side of the client:
//! - A `CredentialProvider` seam for whatever issues bearer tokens
//! - `TokenClient`, the HTTP client-credentials implementation of it
//! - `CredentialStore`, the single holder of the current token

pub mod client;
pub mod response;
pub mod store;

// Re-export key types
pub use client::TokenClient;
pub use response::{AccessToken, GrantRequest, TokenResponse};
pub use store::{CredentialProvider, CredentialStore};
