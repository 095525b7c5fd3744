//! Application-wide constants.

/// Application name.
pub const APP_NAME: &str = "PushLink";

/// Application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// OAuth grant type sent to the credential provider.
pub const CLIENT_CREDENTIALS_GRANT: &str = "client_credentials";

/// Default token request timeout in milliseconds.
pub const DEFAULT_API_TIMEOUT_MS: u64 = 30_000;

/// Default socket handshake timeout in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 15_000;

/// Default number of automatic reconnection attempts.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default base delay between reconnection attempts in milliseconds.
pub const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 5_000;

/// Default number of dispatch workers.
pub const DEFAULT_DISPATCH_WORKERS: usize = 4;

/// Default per-worker dispatch queue capacity.
pub const DEFAULT_DISPATCH_QUEUE_CAPACITY: usize = 256;

/// Default capacity of the per-event broadcast channel.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// WebSocket close codes used by the client.
pub mod close_code {
    /// Normal closure, sent on an explicit disconnect.
    pub const NORMAL: u16 = 1000;
    /// Reported when the stream ends without a close frame.
    pub const ABNORMAL: u16 = 1006;
}
