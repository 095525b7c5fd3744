//! Event catalogue, wire messages and lifecycle notifications.
//!
//! Defines the platform event names the client declares interest in, the
//! inbound envelope and outbound directive shapes, the lifecycle state and
//! the notifications emitted on every transition.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Event names streamed by the platform.
///
/// The named variants form the fixed catalogue declared at startup; any
/// other name the server or a consumer uses is carried as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventName {
    /// A user followed the channel (`channel.follow`).
    ChannelFollow,
    /// A user unfollowed the channel (`channel.unfollow`).
    ChannelUnfollow,
    /// Channel metadata changed (`channel.update`).
    ChannelUpdate,
    /// A new paid subscription (`subscription.new`).
    SubscriptionNew,
    /// Subscriptions gifted by a user (`subscription.gifted`).
    SubscriptionGifted,
    /// A subscription ended (`subscription.end`).
    SubscriptionEnd,
    /// A chat message was sent (`chat.message`).
    ChatMessage,
    /// A poll started (`poll.start`).
    PollStart,
    /// A vote was cast in a poll (`poll.vote`).
    PollVote,
    /// A poll ended (`poll.end`).
    PollEnd,
    /// A user was banned (`user.ban`).
    UserBan,
    /// A user was unbanned (`user.unban`).
    UserUnban,
    /// A moderator was added (`moderator.add`).
    ModeratorAdd,
    /// A moderator was removed (`moderator.remove`).
    ModeratorRemove,
    /// The channel started hosting another (`host.start`).
    HostStart,
    /// Hosting stopped (`host.stop`).
    HostStop,
    /// An incoming raid (`raid`).
    Raid,
    /// A user joined the chatroom (`chatroom.join`).
    ChatroomJoin,
    /// A user left the chatroom (`chatroom.leave`).
    ChatroomLeave,
    /// A user's profile changed (`user.update`).
    UserUpdate,
    /// The livestream went live (`livestream.start`).
    LivestreamStart,
    /// The livestream ended (`livestream.end`).
    LivestreamEnd,
    /// Periodic viewer count update (`livestream.viewer_count`).
    LivestreamViewerCount,
    /// A name outside the built-in catalogue.
    Other(String),
}

/// Wire names of the built-in catalogue, in declaration order.
const CATALOGUE_NAMES: &[&str] = &[
    "channel.follow",
    "channel.unfollow",
    "channel.update",
    "subscription.new",
    "subscription.gifted",
    "subscription.end",
    "chat.message",
    "poll.start",
    "poll.vote",
    "poll.end",
    "user.ban",
    "user.unban",
    "moderator.add",
    "moderator.remove",
    "host.start",
    "host.stop",
    "raid",
    "chatroom.join",
    "chatroom.leave",
    "user.update",
    "livestream.start",
    "livestream.end",
    "livestream.viewer_count",
];

impl EventName {
    /// Parse a wire name. Unknown names become `Other`.
    pub fn parse(s: &str) -> Self {
        match s {
            "channel.follow" => Self::ChannelFollow,
            "channel.unfollow" => Self::ChannelUnfollow,
            "channel.update" => Self::ChannelUpdate,
            "subscription.new" => Self::SubscriptionNew,
            "subscription.gifted" => Self::SubscriptionGifted,
            "subscription.end" => Self::SubscriptionEnd,
            "chat.message" => Self::ChatMessage,
            "poll.start" => Self::PollStart,
            "poll.vote" => Self::PollVote,
            "poll.end" => Self::PollEnd,
            "user.ban" => Self::UserBan,
            "user.unban" => Self::UserUnban,
            "moderator.add" => Self::ModeratorAdd,
            "moderator.remove" => Self::ModeratorRemove,
            "host.start" => Self::HostStart,
            "host.stop" => Self::HostStop,
            "raid" => Self::Raid,
            "chatroom.join" => Self::ChatroomJoin,
            "chatroom.leave" => Self::ChatroomLeave,
            "user.update" => Self::UserUpdate,
            "livestream.start" => Self::LivestreamStart,
            "livestream.end" => Self::LivestreamEnd,
            "livestream.viewer_count" => Self::LivestreamViewerCount,
            other => Self::Other(other.to_string()),
        }
    }

    /// The wire name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::ChannelFollow => "channel.follow",
            Self::ChannelUnfollow => "channel.unfollow",
            Self::ChannelUpdate => "channel.update",
            Self::SubscriptionNew => "subscription.new",
            Self::SubscriptionGifted => "subscription.gifted",
            Self::SubscriptionEnd => "subscription.end",
            Self::ChatMessage => "chat.message",
            Self::PollStart => "poll.start",
            Self::PollVote => "poll.vote",
            Self::PollEnd => "poll.end",
            Self::UserBan => "user.ban",
            Self::UserUnban => "user.unban",
            Self::ModeratorAdd => "moderator.add",
            Self::ModeratorRemove => "moderator.remove",
            Self::HostStart => "host.start",
            Self::HostStop => "host.stop",
            Self::Raid => "raid",
            Self::ChatroomJoin => "chatroom.join",
            Self::ChatroomLeave => "chatroom.leave",
            Self::UserUpdate => "user.update",
            Self::LivestreamStart => "livestream.start",
            Self::LivestreamEnd => "livestream.end",
            Self::LivestreamViewerCount => "livestream.viewer_count",
            Self::Other(s) => s.as_str(),
        }
    }

    /// Whether this name is part of the built-in catalogue.
    pub fn is_catalogued(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    /// Whether this event concerns polls.
    pub fn is_poll_event(&self) -> bool {
        matches!(self, Self::PollStart | Self::PollVote | Self::PollEnd)
    }

    /// Whether this event concerns moderation.
    pub fn is_moderation_event(&self) -> bool {
        matches!(
            self,
            Self::UserBan | Self::UserUnban | Self::ModeratorAdd | Self::ModeratorRemove
        )
    }

    /// The full catalogue declared at startup, in declaration order.
    pub fn catalogue() -> Vec<EventName> {
        CATALOGUE_NAMES.iter().map(|name| Self::parse(name)).collect()
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for EventName {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for EventName {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<&EventName> for EventName {
    fn from(name: &EventName) -> Self {
        name.clone()
    }
}

impl Serialize for EventName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

/// Directive action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionAction {
    Subscribe,
    Unsubscribe,
}

/// Outbound control message: `{"action": "subscribe", "event": "<name>"}`.
///
/// One directive per socket message, never batched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundDirective {
    pub action: SubscriptionAction,
    pub event: EventName,
}

impl OutboundDirective {
    /// Subscribe directive for `event`.
    pub fn subscribe(event: EventName) -> Self {
        Self {
            action: SubscriptionAction::Subscribe,
            event,
        }
    }

    /// Unsubscribe directive for `event`.
    pub fn unsubscribe(event: EventName) -> Self {
        Self {
            action: SubscriptionAction::Unsubscribe,
            event,
        }
    }

    /// Serialize to the wire JSON text.
    pub fn to_wire(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// One inbound message, parsed from a single frame and discarded after dispatch.
#[derive(Debug, Clone)]
pub struct SocketEvent {
    /// Event name carried by the envelope.
    pub event: EventName,
    /// Event payload (`data` field), `Null` when absent.
    pub data: serde_json::Value,
    /// When the frame was read off the socket.
    pub received_at: DateTime<Utc>,
}

impl SocketEvent {
    /// Create an event received now.
    pub fn new(event: EventName, data: serde_json::Value) -> Self {
        Self {
            event,
            data,
            received_at: Utc::now(),
        }
    }

    /// Extract an event from a parsed frame of shape `{"event": "<name>", "data": <payload>}`.
    ///
    /// Returns `None` for any other shape, including a missing or non-string
    /// `event` field.
    pub fn from_envelope(mut value: serde_json::Value) -> Option<Self> {
        let event = value.get("event")?.as_str()?;
        if event.is_empty() {
            return None;
        }
        let event = EventName::parse(event);
        let data = value
            .get_mut("data")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null);
        Some(Self::new(event, data))
    }

    /// The full envelope as the server sent it.
    pub fn envelope(&self) -> serde_json::Value {
        serde_json::json!({ "event": self.event.as_str(), "data": self.data })
    }

    /// Try to parse the data as a FollowPayload.
    pub fn as_follow(&self) -> Option<FollowPayload> {
        match self.event {
            EventName::ChannelFollow | EventName::ChannelUnfollow => {
                serde_json::from_value(self.data.clone()).ok()
            }
            _ => None,
        }
    }

    /// Try to parse the data as a ChatMessagePayload.
    pub fn as_chat_message(&self) -> Option<ChatMessagePayload> {
        if self.event == EventName::ChatMessage {
            serde_json::from_value(self.data.clone()).ok()
        } else {
            None
        }
    }

    /// Try to parse the data as a RaidPayload.
    pub fn as_raid(&self) -> Option<RaidPayload> {
        if self.event == EventName::Raid {
            serde_json::from_value(self.data.clone()).ok()
        } else {
            None
        }
    }

    /// Try to parse the data as a ViewerCountPayload.
    pub fn as_viewer_count(&self) -> Option<ViewerCountPayload> {
        if self.event == EventName::LivestreamViewerCount {
            serde_json::from_value(self.data.clone()).ok()
        } else {
            None
        }
    }
}

/// Typed payload for follow and unfollow events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowPayload {
    pub username: String,
    #[serde(default)]
    pub user_id: Option<u64>,
}

/// Typed payload for chat message events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessagePayload {
    #[serde(default)]
    pub id: Option<String>,
    pub username: String,
    pub content: String,
    #[serde(default)]
    pub chatroom_id: Option<u64>,
}

/// Typed payload for raid events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaidPayload {
    /// Channel the raid came from.
    pub from_channel: String,
    /// Number of viewers brought along.
    pub viewers: u64,
}

/// Typed payload for viewer count updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerCountPayload {
    pub viewers: u64,
}

/// Lifecycle state of the client session.
///
/// `Idle` is initial and is also where an explicit disconnect lands; `Failed`
/// means automatic reconnection gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not trying to connect.
    Idle,
    /// Requesting a bearer token.
    Authenticating,
    /// Opening the socket.
    Connecting,
    /// Socket open, subscriptions replayed, receiving events.
    Connected,
    /// Connection lost or the connect attempt failed.
    Disconnected,
    /// Waiting out the backoff before the next attempt.
    Reconnecting,
    /// Reconnect attempts exhausted; no further automatic attempts.
    Failed,
}

impl ConnectionState {
    /// Whether a session task is working towards or holding a connection.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Authenticating | Self::Connecting | Self::Connected | Self::Reconnecting
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Authenticating => write!(f, "authenticating"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Notifications emitted on lifecycle transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// The socket opened and every registry entry was replayed.
    Connected,
    /// An open socket closed, either on request or abnormally.
    Disconnected {
        /// Close code, when the server sent one.
        code: Option<u16>,
        reason: String,
    },
    /// A connect attempt or the open socket failed.
    Error {
        message: String,
        /// Whether a later attempt could succeed.
        recoverable: bool,
    },
    /// A reconnect attempt is scheduled.
    Reconnecting { attempt: u32, delay: Duration },
    /// Reconnect attempts are exhausted; a manual `connect()` is required.
    ReconnectFailed { attempts: u32 },
}

impl LifecycleEvent {
    /// Short label for logging and CLI output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected { .. } => "disconnected",
            Self::Error { .. } => "error",
            Self::Reconnecting { .. } => "reconnecting",
            Self::ReconnectFailed { .. } => "reconnectFailed",
        }
    }
}
