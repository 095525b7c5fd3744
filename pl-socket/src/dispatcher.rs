//! Inbound message dispatch.
//!
//! Frames are parsed on the socket read loop and handed to a bounded pool of
//! worker threads. Every event name hashes to exactly one worker, so delivery
//! for a single name keeps wire order. Workers are OS threads rather than
//! runtime tasks: a handler that blocks holds up its own shard and nothing
//! else. For each message a worker:
//!
//! 1. broadcasts the named [`SocketEvent`] to [`MessageDispatcher::subscribe`] receivers,
//! 2. invokes every registry handler for that name in registration order,
//! 3. invokes every generic message listener with the full envelope.
//!
//! Handler and listener failures (errors and panics) are logged and isolated.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::{debug, error, warn};

use pl_core::error::PlError;

use crate::events::{EventName, SocketEvent};
use crate::registry::SubscriptionRegistry;

/// Listener on the generic `message` channel; receives every event.
pub type MessageListener = Arc<dyn Fn(&SocketEvent) -> anyhow::Result<()> + Send + Sync>;

/// What happened to one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Queued on the worker that owns this event name.
    Queued(EventName),
    /// Valid JSON but not an `{event, data}` envelope.
    Ignored,
    /// Not valid JSON.
    Malformed,
    /// The owning worker's queue was full.
    Dropped(EventName),
}

/// Routes parsed frames to registry handlers and listeners on a worker pool.
pub struct MessageDispatcher {
    shards: Vec<mpsc::Sender<SocketEvent>>,
    events_tx: broadcast::Sender<SocketEvent>,
    listeners: Arc<RwLock<Vec<MessageListener>>>,
    dropped: AtomicU64,
}

impl MessageDispatcher {
    /// Start `workers` dispatch threads, each with a queue of `queue_capacity`
    /// messages. Threads exit once the dispatcher is dropped.
    ///
    /// When called inside a tokio runtime the workers enter it, so handlers
    /// may use `tokio::spawn`.
    pub fn new(
        registry: Arc<Mutex<SubscriptionRegistry>>,
        workers: usize,
        queue_capacity: usize,
        event_channel_capacity: usize,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(event_channel_capacity.max(1));
        let listeners: Arc<RwLock<Vec<MessageListener>>> = Arc::new(RwLock::new(Vec::new()));

        let runtime = Handle::try_current().ok();

        let shards = (0..workers.max(1))
            .map(|index| {
                let (tx, rx) = mpsc::channel(queue_capacity.max(1));
                let worker = Worker {
                    index,
                    rx,
                    registry: registry.clone(),
                    events_tx: events_tx.clone(),
                    listeners: listeners.clone(),
                };
                let runtime = runtime.clone();
                let spawned = thread::Builder::new()
                    .name(format!("pl-dispatch-{index}"))
                    .spawn(move || {
                        let _entered = runtime.as_ref().map(Handle::enter);
                        worker.run();
                    });
                // Without a thread the receiver is gone and frames for this
                // shard are dropped as `Closed`.
                if let Err(e) = spawned {
                    error!("could not start dispatch worker {index}: {e}");
                }
                tx
            })
            .collect();

        Self {
            shards,
            events_tx,
            listeners,
            dropped: AtomicU64::new(0),
        }
    }

    /// Receive every dispatched event as a named notification.
    ///
    /// Slow receivers that fall behind get `RecvError::Lagged` and miss events.
    pub fn subscribe(&self) -> broadcast::Receiver<SocketEvent> {
        self.events_tx.subscribe()
    }

    /// Add a listener to the generic `message` channel.
    pub async fn add_listener(&self, listener: MessageListener) {
        self.listeners.write().await.push(listener);
    }

    /// Number of generic listeners.
    pub async fn listener_count(&self) -> usize {
        self.listeners.read().await.len()
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.shards.len()
    }

    /// Frames dropped so far because their worker's queue was full.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Parse one text frame and queue it on its worker.
    ///
    /// Never blocks: when the worker's queue is full the message is dropped.
    pub fn handle_frame(&self, text: &str) -> FrameOutcome {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                warn!("dropping frame: {}", PlError::MalformedFrame(e.to_string()));
                return FrameOutcome::Malformed;
            }
        };

        let Some(event) = SocketEvent::from_envelope(value) else {
            return FrameOutcome::Ignored;
        };

        let name = event.event.clone();
        let shard = &self.shards[self.shard_for(&name)];
        match shard.try_send(event) {
            Ok(()) => FrameOutcome::Queued(name),
            Err(mpsc::error::TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!("dispatch queue full, dropping {name} ({total} dropped so far)");
                FrameOutcome::Dropped(name)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("dispatch worker gone, dropping {name}");
                FrameOutcome::Dropped(name)
            }
        }
    }

    fn shard_for(&self, event: &EventName) -> usize {
        let mut hasher = DefaultHasher::new();
        event.as_str().hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }
}

/// One dispatch shard, owned by its thread.
struct Worker {
    index: usize,
    rx: mpsc::Receiver<SocketEvent>,
    registry: Arc<Mutex<SubscriptionRegistry>>,
    events_tx: broadcast::Sender<SocketEvent>,
    listeners: Arc<RwLock<Vec<MessageListener>>>,
}

impl Worker {
    fn run(mut self) {
        debug!("dispatch worker {} started", self.index);
        while let Some(event) = self.rx.blocking_recv() {
            self.dispatch(&event);
        }
        debug!("dispatch worker {} stopped", self.index);
    }

    fn dispatch(&self, event: &SocketEvent) {
        let name = event.event.as_str();

        if let Ok(count) = self.events_tx.send(event.clone()) {
            debug!("dispatched {name} to {count} subscriber(s)");
        }

        let handlers = self.registry.blocking_lock().handlers_for(&event.event);
        for (position, handler) in handlers.iter().enumerate() {
            let result = catch_unwind(AssertUnwindSafe(|| handler(&event.data)));
            if let Some(message) = failure_message(result) {
                let err = PlError::HandlerFailure {
                    event: name.to_string(),
                    message,
                };
                warn!("{err} (handler #{position})");
            }
        }

        let listeners = self.listeners.blocking_read().clone();
        for listener in &listeners {
            let result = catch_unwind(AssertUnwindSafe(|| listener(event)));
            if let Some(message) = failure_message(result) {
                warn!("message listener failed on {name}: {message}");
            }
        }
    }
}

/// Flatten a caught handler result into an error message, if it failed.
fn failure_message(result: std::thread::Result<anyhow::Result<()>>) -> Option<String> {
    match result {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(format!("{e:#}")),
        Err(panic) => Some(
            panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .map(|s| format!("panicked: {s}"))
                .unwrap_or_else(|| "panicked".to_string()),
        ),
    }
}
