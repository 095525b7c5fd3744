//! Socket transport.
//!
//! The supervisor only ever talks to a [`Transport`] (opens connections) and
//! a [`SocketConnection`] (one open socket). [`TungsteniteTransport`] is the
//! production implementation; tests plug in an in-memory one.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::Error as WsError;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use pl_core::error::{PlError, PlResult};

/// One inbound unit the supervisor cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text frame (binary frames holding UTF-8 are converted).
    Text(String),
    /// The peer sent a close frame.
    Closed { code: u16, reason: String },
}

/// Opens authenticated socket connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open `endpoint`, presenting `bearer_token` in the handshake.
    async fn open(&self, endpoint: &str, bearer_token: &str)
        -> PlResult<Box<dyn SocketConnection>>;
}

/// An open socket, owned exclusively by the session task.
#[async_trait]
pub trait SocketConnection: Send {
    /// Send one text message.
    async fn send_text(&mut self, text: String) -> PlResult<()>;

    /// Wait for the next frame. `None` means the stream ended without a close
    /// frame. Must be cancel-safe: dropping the future loses no frame.
    async fn next_frame(&mut self) -> Option<PlResult<Frame>>;

    /// Close the socket with `code` and `reason`.
    async fn close(&mut self, code: u16, reason: &str) -> PlResult<()>;
}

/// `tokio-tungstenite` transport.
#[derive(Debug, Clone)]
pub struct TungsteniteTransport {
    connect_timeout: Duration,
}

impl TungsteniteTransport {
    /// Create a transport that gives up on a handshake after `connect_timeout`.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

/// Build the handshake request for `endpoint` with a bearer `Authorization` header.
pub fn build_request(endpoint: &str, bearer_token: &str) -> PlResult<Request> {
    let mut request = endpoint
        .into_client_request()
        .map_err(|e| PlError::Transport(format!("invalid socket endpoint {endpoint}: {e}")))?;

    let value = HeaderValue::from_str(&format!("Bearer {bearer_token}"))
        .map_err(|e| PlError::Transport(format!("token is not a valid header value: {e}")))?;
    request.headers_mut().insert(AUTHORIZATION, value);
    Ok(request)
}

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn open(
        &self,
        endpoint: &str,
        bearer_token: &str,
    ) -> PlResult<Box<dyn SocketConnection>> {
        let request = build_request(endpoint, bearer_token)?;
        debug!("opening socket {endpoint}");

        let handshake = tokio::time::timeout(self.connect_timeout, connect_async(request)).await;
        let (stream, _response) = match handshake {
            Ok(Ok(result)) => result,
            Ok(Err(WsError::Http(response))) => {
                let status = response.status();
                let message = match status.as_u16() {
                    401 | 403 => format!("handshake rejected credentials ({status})"),
                    _ => format!("handshake refused ({status})"),
                };
                return Err(PlError::Transport(message));
            }
            Ok(Err(e)) => return Err(PlError::Transport(format!("connection failed: {e}"))),
            Err(_) => {
                return Err(PlError::Transport(format!(
                    "handshake timed out after {}ms",
                    self.connect_timeout.as_millis()
                )))
            }
        };

        Ok(Box::new(TungsteniteConnection { stream }))
    }
}

struct TungsteniteConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl SocketConnection for TungsteniteConnection {
    async fn send_text(&mut self, text: String) -> PlResult<()> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| PlError::Transport(format!("send failed: {e}")))
    }

    async fn next_frame(&mut self) -> Option<PlResult<Frame>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(PlError::Transport(e.to_string()))),
            };
            match message {
                Message::Text(text) => return Some(Ok(Frame::Text(text.as_str().to_owned()))),
                Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Some(Ok(Frame::Text(text))),
                    Err(e) => warn!("dropping non-UTF-8 binary frame: {e}"),
                },
                Message::Close(frame) => {
                    let (code, reason) = match frame {
                        Some(frame) => (u16::from(frame.code), frame.reason.as_str().to_owned()),
                        None => (pl_core::constants::close_code::NORMAL, String::new()),
                    };
                    return Some(Ok(Frame::Closed { code, reason }));
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self, code: u16, reason: &str) -> PlResult<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        self.stream
            .close(Some(frame))
            .await
            .map_err(|e| PlError::Transport(format!("close failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_carries_bearer_token() {
        let request = build_request("wss://events.example.com/ws", "abc123").unwrap();
        assert_eq!(
            request.headers().get(AUTHORIZATION).unwrap(),
            "Bearer abc123"
        );
        assert_eq!(request.uri().host(), Some("events.example.com"));
    }

    #[test]
    fn test_invalid_endpoint_is_transport_error() {
        let err = build_request("not a url", "abc").unwrap_err();
        assert!(matches!(err, PlError::Transport(_)));
    }

    #[test]
    fn test_token_with_newline_is_rejected() {
        let err = build_request("ws://localhost/ws", "bad\ntoken").unwrap_err();
        assert!(matches!(err, PlError::Transport(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let transport = TungsteniteTransport::new(Duration::from_millis(500));
        let err = match transport.open("ws://127.0.0.1:9/ws", "abc").await {
            Ok(_) => panic!("connected to a closed port"),
            Err(e) => e,
        };
        assert!(matches!(err, PlError::Transport(_)), "unexpected error: {err:?}");
        assert!(err.is_recoverable());
    }
}
