//! Shared test utilities for integration tests.
//!
//! `MockTransport` stands in for the socket server: every successful open
//! hands the test a [`ServerConn`] through which it pushes frames and reads
//! the directives the client sent.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{timeout, Instant};

use pl_auth::{AccessToken, CredentialProvider, CredentialStore};
use pl_core::error::{PlError, PlResult};
use pl_socket::{
    Frame, LifecycleEvent, ReconnectPolicy, SocketConnection, SocketManager, SocketSettings,
    Transport,
};

/// Guard for waits in tests. Generous so it also holds under paused time,
/// where a full backoff cycle takes 75 virtual seconds.
pub const WAIT: Duration = Duration::from_secs(600);

pub const ENDPOINT: &str = "wss://events.test/ws";

// ---- Credential provider ----

/// Issues `token-1`, `token-2`, ... until told to fail.
#[derive(Default)]
pub struct MockProvider {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl MockProvider {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for MockProvider {
    async fn fetch_token(&self) -> PlResult<AccessToken> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail.load(Ordering::SeqCst) {
            Err(PlError::AuthenticationFailed("401 Unauthorized: invalid_client".into()))
        } else {
            Ok(AccessToken::new(format!("token-{n}")))
        }
    }
}

// ---- Transport ----

/// The server side of one open mock connection.
pub struct ServerConn {
    frames: mpsc::UnboundedSender<Frame>,
    sent: mpsc::UnboundedReceiver<String>,
    client_close: Arc<Mutex<Option<(u16, String)>>>,
}

impl ServerConn {
    /// Push a `{event, data}` envelope.
    pub fn send_event(&self, event: &str, data: Value) {
        let text = serde_json::json!({ "event": event, "data": data }).to_string();
        self.send_raw(&text);
    }

    /// Push an arbitrary text frame.
    pub fn send_raw(&self, text: &str) {
        let _ = self.frames.send(Frame::Text(text.to_string()));
    }

    /// Close from the server side with a close frame.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.frames.send(Frame::Closed {
            code,
            reason: reason.to_string(),
        });
    }

    /// Next directive the client sent, parsed as JSON.
    pub async fn next_directive(&mut self) -> Value {
        let text = timeout(WAIT, self.sent.recv())
            .await
            .expect("timed out waiting for a directive")
            .expect("client connection dropped");
        serde_json::from_str(&text).expect("directive is not JSON")
    }

    /// Next `n` directives as `(action, event)` pairs.
    pub async fn directives(&mut self, n: usize) -> Vec<(String, String)> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let value = self.next_directive().await;
            out.push((
                value["action"].as_str().unwrap_or_default().to_string(),
                value["event"].as_str().unwrap_or_default().to_string(),
            ));
        }
        out
    }

    /// Directives already sent and not yet read.
    pub fn pending_directives(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(text) = self.sent.try_recv() {
            out.push(text);
        }
        out
    }

    /// The close code and reason the client sent, if it closed.
    pub fn client_close(&self) -> Option<(u16, String)> {
        self.client_close.lock().unwrap().clone()
    }
}

struct MockConnection {
    frames: mpsc::UnboundedReceiver<Frame>,
    sent: mpsc::UnboundedSender<String>,
    client_close: Arc<Mutex<Option<(u16, String)>>>,
}

#[async_trait]
impl SocketConnection for MockConnection {
    async fn send_text(&mut self, text: String) -> PlResult<()> {
        self.sent
            .send(text)
            .map_err(|_| PlError::Transport("server went away".into()))
    }

    async fn next_frame(&mut self) -> Option<PlResult<Frame>> {
        self.frames.recv().await.map(Ok)
    }

    async fn close(&mut self, code: u16, reason: &str) -> PlResult<()> {
        *self.client_close.lock().unwrap() = Some((code, reason.to_string()));
        Ok(())
    }
}

/// Scriptable in-memory transport.
pub struct MockTransport {
    servers: mpsc::UnboundedSender<ServerConn>,
    scripted_failures: Mutex<VecDeque<()>>,
    fail_always: AtomicBool,
    opens: Mutex<Vec<Instant>>,
    tokens: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerConn>) {
        let (servers, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            servers,
            scripted_failures: Mutex::new(VecDeque::new()),
            fail_always: AtomicBool::new(false),
            opens: Mutex::new(Vec::new()),
            tokens: Mutex::new(Vec::new()),
        });
        (transport, rx)
    }

    /// Refuse the next `n` handshakes.
    pub fn fail_next(&self, n: usize) {
        let mut failures = self.scripted_failures.lock().unwrap();
        failures.extend(std::iter::repeat(()).take(n));
    }

    /// Refuse every handshake until reset.
    pub fn set_fail_always(&self, fail: bool) {
        self.fail_always.store(fail, Ordering::SeqCst);
    }

    /// Number of handshakes attempted.
    pub fn open_count(&self) -> usize {
        self.opens.lock().unwrap().len()
    }

    /// When each handshake was attempted.
    pub fn open_times(&self) -> Vec<Instant> {
        self.opens.lock().unwrap().clone()
    }

    /// Bearer tokens presented, one per handshake.
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(
        &self,
        endpoint: &str,
        bearer_token: &str,
    ) -> PlResult<Box<dyn SocketConnection>> {
        assert_eq!(endpoint, ENDPOINT);
        self.opens.lock().unwrap().push(Instant::now());
        self.tokens.lock().unwrap().push(bearer_token.to_string());

        let scripted = self.scripted_failures.lock().unwrap().pop_front().is_some();
        if scripted || self.fail_always.load(Ordering::SeqCst) {
            return Err(PlError::Transport("connection refused".into()));
        }

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let client_close = Arc::new(Mutex::new(None));
        let _ = self.servers.send(ServerConn {
            frames: frames_tx,
            sent: sent_rx,
            client_close: client_close.clone(),
        });
        Ok(Box::new(MockConnection {
            frames: frames_rx,
            sent: sent_tx,
            client_close,
        }))
    }
}

// ---- Fixtures ----

/// Everything a test needs to drive one client.
pub struct TestClient {
    pub manager: SocketManager,
    pub transport: Arc<MockTransport>,
    pub provider: Arc<MockProvider>,
    pub credentials: CredentialStore,
    pub servers: mpsc::UnboundedReceiver<ServerConn>,
}

impl TestClient {
    /// Wait for the next connection the client opens.
    pub async fn next_server(&mut self) -> ServerConn {
        timeout(WAIT, self.servers.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("transport dropped")
    }
}

/// Settings without the built-in catalogue so directive assertions stay small.
pub fn create_test_settings() -> SocketSettings {
    let mut settings = SocketSettings::new(ENDPOINT);
    settings.policy = ReconnectPolicy::new(5, Duration::from_millis(5000));
    settings.declare_catalogue = false;
    settings.dispatch_workers = 2;
    settings.dispatch_queue_capacity = 256;
    settings.event_channel_capacity = 64;
    settings
}

pub fn create_test_client() -> TestClient {
    create_test_client_with(create_test_settings())
}

pub fn create_test_client_with(settings: SocketSettings) -> TestClient {
    let (transport, servers) = MockTransport::new();
    let provider = Arc::new(MockProvider::default());
    let credentials = CredentialStore::new(provider.clone());
    let manager = SocketManager::new(settings, credentials.clone(), transport.clone());
    TestClient {
        manager,
        transport,
        provider,
        credentials,
        servers,
    }
}

/// Receive lifecycle events until one matches `pred`; returns all of them.
pub async fn lifecycle_until(
    rx: &mut broadcast::Receiver<LifecycleEvent>,
    pred: impl Fn(&LifecycleEvent) -> bool,
) -> Vec<LifecycleEvent> {
    let mut seen = Vec::new();
    loop {
        let event = timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for a lifecycle event")
            .expect("lifecycle channel closed or lagged");
        let done = pred(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}
