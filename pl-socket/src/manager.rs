//! Event socket connection manager.
//!
//! Owns the session task that authenticates, opens the socket, replays the
//! subscription registry, pumps frames into the dispatcher and reconnects
//! with the linear backoff of [`ReconnectPolicy`].

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use pl_auth::{CredentialStore, TokenClient};
use pl_core::config::AppConfig;
use pl_core::constants::{self, close_code};
use pl_core::error::{PlError, PlResult};

use crate::dispatcher::{FrameOutcome, MessageDispatcher, MessageListener};
use crate::events::{ConnectionState, EventName, LifecycleEvent, OutboundDirective, SocketEvent};
use crate::policy::{ReconnectDecision, ReconnectPolicy};
use crate::registry::{Handler, SubscriptionRegistry};
use crate::transport::{Frame, SocketConnection, Transport, TungsteniteTransport};

/// How long `disconnect()` waits for the session task before aborting it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// How long `connect()` waits for a session that reached a terminal state to exit.
const WIND_DOWN_GRACE: Duration = Duration::from_millis(100);

/// Close reason sent on an explicit disconnect.
const CLIENT_DISCONNECT_REASON: &str = "client disconnect";

/// Connection parameters for a [`SocketManager`].
#[derive(Debug, Clone)]
pub struct SocketSettings {
    /// Socket endpoint URL (`ws://` or `wss://`).
    pub endpoint: String,
    /// Reconnect backoff.
    pub policy: ReconnectPolicy,
    /// Number of dispatch workers.
    pub dispatch_workers: usize,
    /// Queue depth per dispatch worker.
    pub dispatch_queue_capacity: usize,
    /// Buffer of the named-event and lifecycle broadcast channels.
    pub event_channel_capacity: usize,
    /// Declare the built-in event catalogue at construction.
    pub declare_catalogue: bool,
    /// Additional event names declared at construction.
    pub extra_events: Vec<String>,
}

impl SocketSettings {
    /// Settings for `endpoint` with every other value at its default.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            policy: ReconnectPolicy::default(),
            dispatch_workers: constants::DEFAULT_DISPATCH_WORKERS,
            dispatch_queue_capacity: constants::DEFAULT_DISPATCH_QUEUE_CAPACITY,
            event_channel_capacity: constants::DEFAULT_EVENT_CHANNEL_CAPACITY,
            declare_catalogue: true,
            extra_events: Vec::new(),
        }
    }

    /// Build settings from the application configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            endpoint: config.server.socket_url.clone(),
            policy: ReconnectPolicy::from(&config.reconnect),
            dispatch_workers: config.dispatch.workers,
            dispatch_queue_capacity: config.dispatch.queue_capacity,
            event_channel_capacity: config.dispatch.event_channel_capacity,
            declare_catalogue: config.subscriptions.subscribe_catalogue,
            extra_events: config.subscriptions.extra_events.clone(),
        }
    }
}

/// Why a connected session stopped reading.
enum SessionEnd {
    /// `disconnect()` or drop of the manager.
    Shutdown,
    /// The socket closed or failed without being asked to.
    Lost {
        code: u16,
        reason: String,
        error: Option<PlError>,
    },
}

/// Handle to the running session task.
struct SessionHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// State shared between the manager and its session task.
struct Inner {
    settings: SocketSettings,
    credentials: CredentialStore,
    transport: Arc<dyn Transport>,
    registry: Arc<Mutex<SubscriptionRegistry>>,
    dispatcher: MessageDispatcher,
    state_tx: watch::Sender<ConnectionState>,
    lifecycle_tx: broadcast::Sender<LifecycleEvent>,
    /// Consecutive reconnect attempts since the last successful open.
    reconnect_attempts: Mutex<u32>,
}

/// Authenticated event socket client.
///
/// Manages the full lifecycle of one upstream connection:
/// - Authentication through the [`CredentialStore`] before every attempt
/// - Subscription replay after every successful open
/// - Frame dispatch to handlers on a worker pool
/// - Linear reconnect backoff (5s, 10s, 15s, ... up to `max_attempts`)
///
/// Lifecycle operations (`connect`, `disconnect`) are meant to be called
/// sequentially. Dropping the manager shuts the session down.
pub struct SocketManager {
    inner: Arc<Inner>,
    session: Mutex<Option<SessionHandle>>,
}

impl SocketManager {
    /// Create a manager and start its dispatch worker threads.
    pub fn new(
        settings: SocketSettings,
        credentials: CredentialStore,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let mut registry = SubscriptionRegistry::new();
        if settings.declare_catalogue {
            for event in EventName::catalogue() {
                registry.declare(event);
            }
        }
        for name in &settings.extra_events {
            let event = EventName::parse(name);
            if !event.is_catalogued() {
                debug!("declaring event outside the catalogue: {event}");
            }
            registry.declare(event);
        }
        let registry = Arc::new(Mutex::new(registry));

        let dispatcher = MessageDispatcher::new(
            registry.clone(),
            settings.dispatch_workers,
            settings.dispatch_queue_capacity,
            settings.event_channel_capacity,
        );
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let (lifecycle_tx, _) = broadcast::channel(settings.event_channel_capacity.max(1));

        Self {
            inner: Arc::new(Inner {
                settings,
                credentials,
                transport,
                registry,
                dispatcher,
                state_tx,
                lifecycle_tx,
                reconnect_attempts: Mutex::new(0),
            }),
            session: Mutex::new(None),
        }
    }

    /// Create a manager wired to the real token endpoint and socket transport.
    pub fn from_config(config: &AppConfig) -> PlResult<Self> {
        config.validate()?;
        let client = TokenClient::new(&config.server)?;
        let transport =
            TungsteniteTransport::new(Duration::from_millis(config.server.connect_timeout_ms));
        Ok(Self::new(
            SocketSettings::from_config(config),
            CredentialStore::new(Arc::new(client)),
            Arc::new(transport),
        ))
    }

    /// Start the session and wait for the outcome of the first attempt.
    ///
    /// Returns immediately if a session is already running. A failed first
    /// attempt is returned to the caller while the reconnect policy keeps
    /// trying in the background, whether authentication or the handshake failed.
    pub async fn connect(&self) -> PlResult<()> {
        let mut session = self.session.lock().await;
        if let Some(handle) = session.as_mut() {
            // A session that just gave up may still be returning.
            let winding_down = !self.state().is_active();
            let finished = handle.task.is_finished()
                || (winding_down
                    && tokio::time::timeout(WIND_DOWN_GRACE, &mut handle.task)
                        .await
                        .is_ok());
            if !finished {
                debug!("session already running ({}), skipping", self.state());
                return Ok(());
            }
        }

        *self.inner.reconnect_attempts.lock().await = 0;
        info!("socket connecting to {}", self.inner.settings.endpoint);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (ready_tx, ready_rx) = oneshot::channel();
        let inner = self.inner.clone();
        let task = tokio::spawn(async move { inner.run_session(shutdown_rx, ready_tx).await });
        *session = Some(SessionHandle { shutdown_tx, task });
        drop(session);

        match ready_rx.await {
            Ok(result) => result,
            Err(_) => Err(PlError::Cancelled(
                "session ended before the first attempt completed".into(),
            )),
        }
    }

    /// Close the socket with a normal closure and cancel any pending reconnect.
    ///
    /// Always succeeds and leaves the manager `Idle`.
    pub async fn disconnect(&self) {
        let handle = self.session.lock().await.take();
        if let Some(mut handle) = handle {
            let _ = handle.shutdown_tx.send(true);
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle.task)
                .await
                .is_err()
            {
                warn!("session task did not stop within {SHUTDOWN_GRACE:?}, aborting");
                handle.task.abort();
            }
        }

        self.inner.registry.lock().await.detach();
        self.inner.set_state(ConnectionState::Idle);
        info!("socket disconnected");
    }

    /// Register `handler` for `event`.
    ///
    /// Handlers accumulate; registering the same function twice runs it twice.
    /// While connected a subscribe directive is sent immediately.
    pub async fn on<F>(&self, event: impl Into<EventName>, handler: F)
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let event = event.into();
        let handler: Handler = Arc::new(handler);
        if self.inner.registry.lock().await.register(event.clone(), handler) {
            debug!("new subscription: {event}");
        }
    }

    /// Remove every handler for `event`. Returns how many were removed.
    ///
    /// While connected an unsubscribe directive is sent if the event was registered.
    pub async fn unsubscribe(&self, event: impl Into<EventName>) -> usize {
        let event = event.into();
        let removed = self.inner.registry.lock().await.unregister(&event);
        match removed {
            Some(count) => {
                debug!("unsubscribed {event} ({count} handler(s))");
                count
            }
            None => 0,
        }
    }

    /// Add a listener to the generic `message` channel (every event).
    pub async fn on_message<F>(&self, listener: F)
    where
        F: Fn(&SocketEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let listener: MessageListener = Arc::new(listener);
        self.inner.dispatcher.add_listener(listener).await;
    }

    /// Subscribe to per-event notifications.
    ///
    /// The channel is bounded by `event_channel_capacity`. A receiver that
    /// falls behind gets `RecvError::Lagged` and misses the oldest events.
    pub fn events(&self) -> broadcast::Receiver<SocketEvent> {
        self.inner.dispatcher.subscribe()
    }

    /// Subscribe to lifecycle notifications.
    pub fn lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.lifecycle_tx.subscribe()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Subscribe to lifecycle state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Registered event names, in registration order.
    pub async fn subscribed_events(&self) -> Vec<EventName> {
        self.inner.registry.lock().await.event_names()
    }

    /// Frames dropped because their dispatch queue was full. Each drop is
    /// also reported as a recoverable `LifecycleEvent::Error`.
    pub fn dropped_frames(&self) -> u64 {
        self.inner.dispatcher.dropped_frames()
    }

    /// Consecutive reconnect attempts since the last successful open.
    pub async fn reconnect_attempts(&self) -> u32 {
        *self.inner.reconnect_attempts.lock().await
    }

    /// The configured socket endpoint.
    pub fn endpoint(&self) -> &str {
        &self.inner.settings.endpoint
    }
}

impl Drop for SocketManager {
    fn drop(&mut self) {
        if let Some(handle) = self.session.get_mut().take() {
            let _ = handle.shutdown_tx.send(true);
        }
    }
}

impl Inner {
    /// Update the lifecycle state and notify watchers.
    fn set_state(&self, new_state: ConnectionState) {
        self.state_tx.send_if_modified(|state| {
            if *state == new_state {
                return false;
            }
            info!("socket state: {state} -> {new_state}");
            *state = new_state;
            true
        });
    }

    fn emit(&self, event: LifecycleEvent) {
        debug!("lifecycle: {}", event.label());
        let _ = self.lifecycle_tx.send(event);
    }

    /// Session loop: establish, drive, and reconnect until shut down or failed.
    async fn run_session(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
        ready: oneshot::Sender<PlResult<()>>,
    ) {
        let mut ready = Some(ready);

        loop {
            let attempt = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => {
                    if let Some(ready) = ready.take() {
                        let _ = ready.send(Err(PlError::Cancelled("disconnect requested".into())));
                    }
                    debug!("session shut down while connecting");
                    return;
                }
                result = self.establish() => result,
            };

            match attempt {
                Ok(mut connection) => {
                    let (directive_tx, mut directive_rx) = mpsc::unbounded_channel();
                    let replayed = self.registry.lock().await.attach(directive_tx);
                    *self.reconnect_attempts.lock().await = 0;
                    self.set_state(ConnectionState::Connected);
                    info!("connected, replaying {replayed} subscription(s)");
                    self.emit(LifecycleEvent::Connected);
                    if let Some(ready) = ready.take() {
                        let _ = ready.send(Ok(()));
                    }

                    let end = self
                        .drive(connection.as_mut(), &mut directive_rx, &mut shutdown)
                        .await;
                    self.registry.lock().await.detach();

                    match end {
                        SessionEnd::Shutdown => {
                            self.set_state(ConnectionState::Idle);
                            self.emit(LifecycleEvent::Disconnected {
                                code: Some(close_code::NORMAL),
                                reason: CLIENT_DISCONNECT_REASON.to_string(),
                            });
                            return;
                        }
                        SessionEnd::Lost {
                            code,
                            reason,
                            error,
                        } => {
                            warn!("connection lost (code {code}): {reason}");
                            if let Some(e) = error {
                                self.emit(LifecycleEvent::Error {
                                    message: e.to_string(),
                                    recoverable: e.is_recoverable(),
                                });
                            }
                            self.set_state(ConnectionState::Disconnected);
                            self.emit(LifecycleEvent::Disconnected {
                                code: Some(code),
                                reason,
                            });
                        }
                    }
                }
                Err(e) => {
                    warn!("connect attempt failed: {e}");
                    self.set_state(ConnectionState::Disconnected);
                    self.emit(LifecycleEvent::Error {
                        message: e.to_string(),
                        recoverable: e.is_recoverable(),
                    });
                    if let Some(ready) = ready.take() {
                        let _ = ready.send(Err(e));
                    }
                }
            }

            let made = *self.reconnect_attempts.lock().await;
            match self.settings.policy.decide(made) {
                ReconnectDecision::Retry { attempt, delay } => {
                    *self.reconnect_attempts.lock().await = attempt;
                    self.set_state(ConnectionState::Reconnecting);
                    warn!(
                        "reconnection attempt {attempt}/{} in {:.1}s",
                        self.settings.policy.max_attempts,
                        delay.as_secs_f64()
                    );
                    self.emit(LifecycleEvent::Reconnecting { attempt, delay });

                    tokio::select! {
                        biased;
                        _ = shutdown_requested(&mut shutdown) => {
                            info!("pending reconnection cancelled by disconnect request");
                            return;
                        }
                        _ = sleep(delay) => {}
                    }
                }
                ReconnectDecision::GiveUp => {
                    error!("max reconnection attempts ({made}) reached");
                    self.emit(LifecycleEvent::ReconnectFailed { attempts: made });
                    self.set_state(ConnectionState::Failed);
                    return;
                }
            }
        }
    }

    /// Authenticate and open the socket.
    async fn establish(&self) -> PlResult<Box<dyn SocketConnection>> {
        self.set_state(ConnectionState::Authenticating);
        let token = self.credentials.authenticate().await?;

        self.set_state(ConnectionState::Connecting);
        match self.transport.open(&self.settings.endpoint, &token).await {
            Ok(connection) => Ok(connection),
            Err(e) => {
                // The token is suspect once a handshake using it fails.
                self.credentials.invalidate().await;
                Err(e)
            }
        }
    }

    /// Pump directives out and frames in until shutdown or connection loss.
    async fn drive(
        &self,
        connection: &mut dyn SocketConnection,
        directives: &mut mpsc::UnboundedReceiver<OutboundDirective>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(shutdown) => {
                    if let Err(e) = connection.close(close_code::NORMAL, CLIENT_DISCONNECT_REASON).await {
                        debug!("close on disconnect failed: {e}");
                    }
                    return SessionEnd::Shutdown;
                }
                Some(directive) = directives.recv() => {
                    let text = match directive.to_wire() {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("could not encode directive for {}: {e}", directive.event);
                            continue;
                        }
                    };
                    if let Err(e) = connection.send_text(text).await {
                        return SessionEnd::Lost {
                            code: close_code::ABNORMAL,
                            reason: e.to_string(),
                            error: Some(e),
                        };
                    }
                }
                frame = connection.next_frame() => match frame {
                    Some(Ok(Frame::Text(text))) => {
                        if let FrameOutcome::Dropped(name) = self.dispatcher.handle_frame(&text) {
                            self.emit(LifecycleEvent::Error {
                                message: format!("dispatch queue full, dropped {name}"),
                                recoverable: true,
                            });
                        }
                    }
                    Some(Ok(Frame::Closed { code, reason })) => {
                        return SessionEnd::Lost { code, reason, error: None };
                    }
                    Some(Err(e)) => {
                        return SessionEnd::Lost {
                            code: close_code::ABNORMAL,
                            reason: e.to_string(),
                            error: Some(e),
                        };
                    }
                    None => {
                        return SessionEnd::Lost {
                            code: close_code::ABNORMAL,
                            reason: "stream ended without a close frame".to_string(),
                            error: None,
                        };
                    }
                },
            }
        }
    }
}

/// Resolves once shutdown is signalled or the manager is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use pl_auth::{AccessToken, CredentialProvider};

    struct StaticProvider {
        fail: bool,
    }

    #[async_trait]
    impl CredentialProvider for StaticProvider {
        async fn fetch_token(&self) -> PlResult<AccessToken> {
            if self.fail {
                Err(PlError::AuthenticationFailed("invalid_client".into()))
            } else {
                Ok(AccessToken::new("token"))
            }
        }
    }

    /// A transport whose handshakes always fail.
    struct RefusingTransport {
        opens: AtomicUsize,
    }

    #[async_trait]
    impl Transport for RefusingTransport {
        async fn open(&self, _: &str, _: &str) -> PlResult<Box<dyn SocketConnection>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Err(PlError::Transport("connection refused".into()))
        }
    }

    fn manager(fail_auth: bool, settings: SocketSettings) -> (SocketManager, Arc<RefusingTransport>) {
        let transport = Arc::new(RefusingTransport {
            opens: AtomicUsize::new(0),
        });
        let credentials = CredentialStore::new(Arc::new(StaticProvider { fail: fail_auth }));
        (
            SocketManager::new(settings, credentials, transport.clone()),
            transport,
        )
    }

    #[tokio::test]
    async fn test_new_manager_is_idle_with_catalogue() {
        let (manager, _) = manager(false, SocketSettings::new("ws://localhost/ws"));
        assert_eq!(manager.state(), ConnectionState::Idle);
        assert_eq!(manager.reconnect_attempts().await, 0);
        assert_eq!(manager.subscribed_events().await, EventName::catalogue());
    }

    #[tokio::test]
    async fn test_extra_events_are_declared() {
        let mut settings = SocketSettings::new("ws://localhost/ws");
        settings.declare_catalogue = false;
        settings.extra_events = vec!["kicks.gifted".into(), "raid".into()];
        let (manager, _) = manager(false, settings);
        assert_eq!(
            manager.subscribed_events().await,
            vec![EventName::Other("kicks.gifted".into()), EventName::Raid]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_auth_failure_follows_reconnect_policy() {
        let mut settings = SocketSettings::new("ws://localhost/ws");
        settings.policy = ReconnectPolicy::new(2, Duration::from_millis(5000));
        let (manager, transport) = manager(true, settings);
        let mut lifecycle = manager.lifecycle();

        let err = manager.connect().await.unwrap_err();
        assert!(err.is_auth_failure());

        let mut state = manager.state_receiver();
        state
            .wait_for(|s| *s == ConnectionState::Failed)
            .await
            .unwrap();
        assert_eq!(transport.opens.load(Ordering::SeqCst), 0);

        let mut seen = Vec::new();
        while let Ok(event) = lifecycle.try_recv() {
            seen.push(event);
        }
        let scheduled: Vec<u32> = seen
            .iter()
            .filter_map(|e| match e {
                LifecycleEvent::Reconnecting { attempt, .. } => Some(*attempt),
                _ => None,
            })
            .collect();
        assert_eq!(scheduled, vec![1, 2]);
        assert_eq!(seen.last(), Some(&LifecycleEvent::ReconnectFailed { attempts: 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_transport_failure_keeps_reconnecting() {
        let (manager, transport) = manager(false, SocketSettings::new("ws://localhost/ws"));
        let err = manager.connect().await.unwrap_err();
        assert!(matches!(err, PlError::Transport(_)));

        let mut state = manager.state_receiver();
        state
            .wait_for(|s| *s == ConnectionState::Reconnecting)
            .await
            .unwrap();
        assert_eq!(manager.reconnect_attempts().await, 1);

        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Idle);
        assert_eq!(transport.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disconnect_when_idle_is_noop() {
        let (manager, _) = manager(false, SocketSettings::new("ws://localhost/ws"));
        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_event_removes_nothing() {
        let (manager, _) = manager(false, SocketSettings::new("ws://localhost/ws"));
        assert_eq!(manager.unsubscribe("never.registered").await, 0);
        manager.on("chat.message", |_: &Value| Ok(())).await;
        manager.on(EventName::ChatMessage, |_: &Value| Ok(())).await;
        assert_eq!(manager.unsubscribe(EventName::ChatMessage).await, 2);
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = AppConfig::default();
        config.server.socket_url = "wss://events.example.com/ws".into();
        config.reconnect.max_attempts = 2;
        config.subscriptions.subscribe_catalogue = false;
        let settings = SocketSettings::from_config(&config);
        assert_eq!(settings.endpoint, "wss://events.example.com/ws");
        assert_eq!(settings.policy.max_attempts, 2);
        assert!(!settings.declare_catalogue);
    }
}
