//! PushLink Socket - authenticated event stream client.
//!
//! This crate provides the connection engine that:
//! - Authenticates and opens the event socket with a bearer token
//! - Keeps the wire subscriptions equal to the local subscription registry,
//!   replaying every entry after each (re)connect
//! - Dispatches inbound envelopes to per-event handlers and generic listeners
//!   on a bounded worker pool, isolating handler failures
//! - Reconnects with a bounded, linearly increasing backoff

pub mod dispatcher;
pub mod events;
pub mod manager;
pub mod policy;
pub mod registry;
pub mod transport;

// Re-export key types
pub use dispatcher::{FrameOutcome, MessageDispatcher, MessageListener};
pub use events::{
    ChatMessagePayload, ConnectionState, EventName, FollowPayload, LifecycleEvent,
    OutboundDirective, RaidPayload, SocketEvent, SubscriptionAction, ViewerCountPayload,
};
pub use manager::{SocketManager, SocketSettings};
pub use policy::{ReconnectDecision, ReconnectPolicy};
pub use registry::{Handler, SubscriptionRegistry};
pub use transport::{Frame, SocketConnection, Transport, TungsteniteTransport};
