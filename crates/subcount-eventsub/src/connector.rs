//! Event socket transport.
//!
//! The session machine never touches a WebSocket directly. A [`Connector`]
//! opens a link and hands back a [`SocketLink`]: a channel of inbound
//! [`SocketEvent`]s plus a token that closes the socket when cancelled.
//! Once the token is cancelled no further events are delivered.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use subcount_core::ConnectError;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Close code reported when the stream ends without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

const LINK_BUFFER: usize = 64;

/// Something the socket produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketEvent {
    /// A text frame.
    Text(String),
    /// The socket closed. Always the last event of a link.
    Closed {
        /// WebSocket close code, [`ABNORMAL_CLOSURE`] when none was sent.
        code: u16,
        /// Close reason text.
        reason: String,
    },
}

/// An open socket as seen by the session machine.
#[derive(Debug)]
pub struct SocketLink {
    /// Inbound events, in arrival order.
    pub events: mpsc::Receiver<SocketEvent>,
    /// Cancel to close the socket.
    pub close: CancellationToken,
}

/// Opens event sockets.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a socket to `url`.
    async fn connect(&self, url: &str) -> Result<SocketLink, ConnectError>;
}

/// [`Connector`] over `tokio-tungstenite`.
#[derive(Clone, Debug)]
pub struct TungsteniteConnector {
    timeout: Duration,
}

impl TungsteniteConnector {
    /// Connector whose handshakes give up after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<SocketLink, ConnectError> {
        let (ws, _) = tokio::time::timeout(self.timeout, connect_async(url))
            .await
            .map_err(|_| ConnectError::Timeout {
                url: url.to_owned(),
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            })?
            .map_err(|e| ConnectError::Unreachable {
                url: url.to_owned(),
                message: e.to_string(),
            })?;
        debug!(url, "event socket connected");

        let (tx, rx) = mpsc::channel(LINK_BUFFER);
        let close = CancellationToken::new();
        drop(tokio::spawn(read_loop(ws, tx, close.clone())));
        Ok(SocketLink { events: rx, close })
    }
}

async fn read_loop<S>(
    mut ws: tokio_tungstenite::WebSocketStream<S>,
    tx: mpsc::Sender<SocketEvent>,
    close: CancellationToken,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            () = close.cancelled() => {
                let _ = ws.close(None).await;
                return;
            }
            msg = ws.next() => {
                let event = match msg {
                    Some(Ok(Message::Text(text))) => SocketEvent::Text(text.as_str().to_owned()),
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame.map_or((ABNORMAL_CLOSURE, String::new()), |f| {
                            (u16::from(f.code), f.reason.as_str().to_owned())
                        });
                        let _ = tx.send(SocketEvent::Closed { code, reason }).await;
                        return;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(error = %e, "event socket read failed");
                        let _ = tx
                            .send(SocketEvent::Closed { code: ABNORMAL_CLOSURE, reason: e.to_string() })
                            .await;
                        return;
                    }
                    None => {
                        let _ = tx
                            .send(SocketEvent::Closed { code: ABNORMAL_CLOSURE, reason: String::new() })
                            .await;
                        return;
                    }
                };
                if tx.send(event).await.is_err() {
                    let _ = ws.close(None).await;
                    return;
                }
            }
        }
    }
}
