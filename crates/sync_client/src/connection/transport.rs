//! Transport abstraction over the WebSocket link.
//!
//! The [`ConnectionManager`](super::ConnectionManager) owns exactly one
//! [`Transport`] at a time and reaches it only through these traits, so the
//! integration tests can substitute a scripted in-memory transport for the
//! real tokio-tungstenite stream.

use crate::error::SyncError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// WebSocket close code for a voluntary shutdown; never triggers reconnect.
pub const NORMAL_CLOSE: u16 = 1000;

/// Close code reported when the stream ended without a close frame.
const ABNORMAL_CLOSE: u16 = 1006;

/// One observation from the transport read side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportItem {
    /// A complete text frame arrived.
    Text(String),
    /// The peer closed the connection with the given close code.
    Closed {
        /// WebSocket close code; `1000` is voluntary, everything else abnormal.
        code: u16,
        /// Human-readable close reason, possibly empty.
        reason: String,
    },
    /// The transport failed mid-stream (I/O or protocol error).
    Failed(String),
}

/// A live, bidirectional frame transport.
#[async_trait]
pub trait Transport: Send {
    /// Sends one text frame. Errors indicate the transport is unusable.
    async fn send(&mut self, text: String) -> Result<(), SyncError>;

    /// Waits for the next inbound observation.
    ///
    /// Must be cancel-safe: the supervisor drops and recreates this future
    /// on every `select!` iteration.
    async fn next(&mut self) -> TransportItem;

    /// Closes the transport with the voluntary close code. Best effort.
    async fn close(&mut self);
}

/// Dials new transports; one connector is shared across reconnect attempts.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Opens a fresh transport to `url`.
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, SyncError>;
}

/// Production connector backed by tokio-tungstenite.
#[derive(Debug, Default)]
pub struct WsConnector;

#[async_trait]
impl TransportConnector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, SyncError> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| SyncError::Connection(format!("websocket dial failed: {e}")))?;
        debug!("websocket open to {} (status {})", url, response.status());
        Ok(Box::new(WsTransport { stream }))
    }
}

/// [`Transport`] over a tokio-tungstenite WebSocket stream.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> Result<(), SyncError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| SyncError::Connection(format!("websocket send failed: {e}")))
    }

    async fn next(&mut self) -> TransportItem {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return TransportItem::Text(text.to_string()),
                // Control and binary frames carry no protocol frames; the
                // library answers pings on our behalf during the next write.
                Some(Ok(Message::Ping(_)))
                | Some(Ok(Message::Pong(_)))
                | Some(Ok(Message::Binary(_)))
                | Some(Ok(Message::Frame(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((ABNORMAL_CLOSE, String::new()));
                    return TransportItem::Closed { code, reason };
                }
                Some(Err(e)) => return TransportItem::Failed(e.to_string()),
                None => {
                    return TransportItem::Closed {
                        code: ABNORMAL_CLOSE,
                        reason: "stream ended".into(),
                    }
                }
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport").finish_non_exhaustive()
    }
}
