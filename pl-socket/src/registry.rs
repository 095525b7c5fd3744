//! Subscription registry.
//!
//! Maps each event name to its ordered handler list and is the source of
//! truth for what should be subscribed on the wire. While a connection is
//! open the registry holds that connection's directive sender, so every
//! change is mirrored onto the wire under the same lock that changes the
//! map. Attaching a new connection queues the full replay before any later
//! change can be queued.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::events::{EventName, OutboundDirective};

/// A consumer callback for one event name.
///
/// Handlers run on a dedicated dispatch thread, never on the socket read loop
/// or a runtime worker. A handler may block; it then delays only the event
/// names that share its thread. A handler that returns an error or panics is
/// logged and skipped.
pub type Handler = Arc<dyn Fn(&Value) -> anyhow::Result<()> + Send + Sync>;

/// Sending half of the open connection's directive queue.
pub type DirectiveSender = mpsc::UnboundedSender<OutboundDirective>;

/// One event name and its handlers, in registration order.
#[derive(Clone)]
pub struct SubscriptionEntry {
    pub event: EventName,
    pub handlers: Vec<Handler>,
}

/// Event name → ordered handler list, kept in registration order.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: Vec<SubscriptionEntry>,
    wire: Option<DirectiveSender>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to the entry for `event`, creating the entry if absent.
    ///
    /// Handlers are never deduplicated. When attached to a connection a
    /// subscribe directive is queued every time, even for an existing entry.
    /// Returns true if a new entry was created.
    pub fn register(&mut self, event: EventName, handler: Handler) -> bool {
        let created = match self.position(&event) {
            Some(idx) => {
                self.entries[idx].handlers.push(handler);
                false
            }
            None => {
                self.entries.push(SubscriptionEntry {
                    event: event.clone(),
                    handlers: vec![handler],
                });
                true
            }
        };
        self.send(OutboundDirective::subscribe(event));
        created
    }

    /// Declare interest in `event` without a handler.
    ///
    /// Creates an empty entry if none exists; notifications still flow for it.
    /// Returns true if a new entry was created.
    pub fn declare(&mut self, event: EventName) -> bool {
        if self.position(&event).is_some() {
            return false;
        }
        self.entries.push(SubscriptionEntry {
            event: event.clone(),
            handlers: Vec::new(),
        });
        self.send(OutboundDirective::subscribe(event));
        true
    }

    /// Remove the whole entry for `event`, all of its handlers included.
    ///
    /// Queues one unsubscribe directive if the entry existed and a connection
    /// is attached. Returns the number of handlers removed, or `None` if there
    /// was no entry.
    pub fn unregister(&mut self, event: &EventName) -> Option<usize> {
        let idx = self.position(event)?;
        let entry = self.entries.remove(idx);
        self.send(OutboundDirective::unsubscribe(entry.event));
        Some(entry.handlers.len())
    }

    /// Subscribe directives for every entry, in registration order.
    pub fn replay_all(&self) -> Vec<OutboundDirective> {
        self.entries
            .iter()
            .map(|entry| OutboundDirective::subscribe(entry.event.clone()))
            .collect()
    }

    /// Attach a freshly opened connection: queue the full replay onto `wire`
    /// and mirror every later change onto it. Returns the number of replayed
    /// directives.
    pub fn attach(&mut self, wire: DirectiveSender) -> usize {
        let replay = self.replay_all();
        let count = replay.len();
        for directive in replay {
            if wire.send(directive).is_err() {
                debug!("connection closed during subscription replay");
                break;
            }
        }
        self.wire = Some(wire);
        count
    }

    /// Detach from the connection; later changes stay local until the next attach.
    pub fn detach(&mut self) {
        self.wire = None;
    }

    /// Whether a connection is attached.
    pub fn is_attached(&self) -> bool {
        self.wire.is_some()
    }

    /// Snapshot of the handlers for `event`, in registration order.
    pub fn handlers_for(&self, event: &EventName) -> Vec<Handler> {
        self.position(event)
            .map(|idx| self.entries[idx].handlers.clone())
            .unwrap_or_default()
    }

    /// Registered event names, in registration order.
    pub fn event_names(&self) -> Vec<EventName> {
        self.entries.iter().map(|entry| entry.event.clone()).collect()
    }

    /// Whether an entry exists for `event`.
    pub fn contains(&self, event: &EventName) -> bool {
        self.position(event).is_some()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, event: &EventName) -> Option<usize> {
        self.entries.iter().position(|entry| entry.event == *event)
    }

    fn send(&self, directive: OutboundDirective) {
        if let Some(wire) = &self.wire {
            debug!("queueing {:?} {}", directive.action, directive.event);
            if wire.send(directive).is_err() {
                debug!("directive dropped: connection already closed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SubscriptionAction;

    fn noop() -> Handler {
        Arc::new(|_: &Value| -> anyhow::Result<()> { Ok(()) })
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<OutboundDirective>) -> Vec<OutboundDirective> {
        let mut out = Vec::new();
        while let Ok(d) = rx.try_recv() {
            out.push(d);
        }
        out
    }

    #[test]
    fn test_register_appends_without_dedup() {
        let mut registry = SubscriptionRegistry::new();
        let handler = noop();
        assert!(registry.register(EventName::ChatMessage, handler.clone()));
        assert!(!registry.register(EventName::ChatMessage, handler));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.handlers_for(&EventName::ChatMessage).len(), 2);
    }

    #[test]
    fn test_unregister_removes_all_handlers() {
        let mut registry = SubscriptionRegistry::new();
        registry.register(EventName::Raid, noop());
        registry.register(EventName::Raid, noop());
        assert_eq!(registry.unregister(&EventName::Raid), Some(2));
        assert!(!registry.contains(&EventName::Raid));
        assert!(registry.handlers_for(&EventName::Raid).is_empty());
        assert_eq!(registry.unregister(&EventName::Raid), None);
    }

    #[test]
    fn test_replay_preserves_registration_order() {
        let mut registry = SubscriptionRegistry::new();
        registry.register(EventName::PollEnd, noop());
        registry.declare(EventName::ChannelFollow);
        registry.register("custom.event".into(), noop());
        registry.register(EventName::PollEnd, noop());

        let names: Vec<String> = registry
            .replay_all()
            .into_iter()
            .map(|d| d.event.to_string())
            .collect();
        assert_eq!(names, vec!["poll.end", "channel.follow", "custom.event"]);
    }

    #[test]
    fn test_detached_changes_send_nothing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut registry = SubscriptionRegistry::new();
        registry.register(EventName::ChatMessage, noop());
        assert_eq!(registry.attach(tx), 1);
        registry.detach();

        registry.register(EventName::Raid, noop());
        registry.unregister(&EventName::ChatMessage);
        let sent = drain(&mut rx);
        assert_eq!(sent, vec![OutboundDirective::subscribe(EventName::ChatMessage)]);
    }

    #[test]
    fn test_attached_changes_follow_replay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut registry = SubscriptionRegistry::new();
        registry.declare(EventName::ChannelFollow);
        registry.attach(tx);

        registry.register(EventName::ChannelFollow, noop());
        registry.register(EventName::Raid, noop());
        registry.unregister(&EventName::ChannelFollow);
        registry.unregister(&EventName::ChannelFollow);

        let sent = drain(&mut rx);
        assert_eq!(
            sent,
            vec![
                OutboundDirective::subscribe(EventName::ChannelFollow),
                OutboundDirective::subscribe(EventName::ChannelFollow),
                OutboundDirective::subscribe(EventName::Raid),
                OutboundDirective::unsubscribe(EventName::ChannelFollow),
            ]
        );
        let unsubscribes = sent
            .iter()
            .filter(|d| d.action == SubscriptionAction::Unsubscribe)
            .count();
        assert_eq!(unsubscribes, 1);
    }

    #[test]
    fn test_declare_is_idempotent() {
        let mut registry = SubscriptionRegistry::new();
        assert!(registry.declare(EventName::Raid));
        assert!(!registry.declare(EventName::Raid));
        assert_eq!(registry.len(), 1);
        assert!(registry.handlers_for(&EventName::Raid).is_empty());
    }
}
