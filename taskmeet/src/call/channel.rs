//! Signaling channel to the relay.
//!
//! [`WsSignalingChannel`] speaks the relay protocol over a WebSocket: each
//! [`ClientMessage`] and [`ServerMessage`] travels postcard-encoded in one
//! binary frame. A background task reads frames and hands decoded messages
//! to [`SignalingChannel::recv`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use taskmeet_proto::call::{ClientMessage, ServerMessage};
use taskmeet_proto::codec::{self, CodecError};

type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Errors from the signaling channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The relay URL is not a `ws://` or `wss://` URL.
    #[error("invalid relay url {url}: {reason}")]
    InvalidUrl {
        /// URL as given.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Connecting took longer than the configured timeout.
    #[error("timed out connecting to relay")]
    Timeout,

    /// The relay could not be reached.
    #[error("relay unreachable: {0}")]
    Unreachable(String),

    /// The connection is closed.
    #[error("relay connection closed")]
    Closed,

    /// A message could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Bidirectional message pipe to the relay.
pub trait SignalingChannel: Send + Sync {
    /// Sends one message to the relay.
    fn send(
        &self,
        msg: &ClientMessage,
    ) -> impl std::future::Future<Output = Result<(), ChannelError>> + Send;

    /// Waits for the next message from the relay.
    ///
    /// Returns [`ChannelError::Closed`] once the connection is gone.
    fn recv(&self) -> impl std::future::Future<Output = Result<ServerMessage, ChannelError>> + Send;

    /// True while the connection is up.
    fn is_connected(&self) -> bool;
}

/// WebSocket connection to a relay server.
pub struct WsSignalingChannel {
    relay_url: String,
    ws_sender: Mutex<WsSender>,
    incoming: Mutex<mpsc::Receiver<ServerMessage>>,
    connected: Arc<AtomicBool>,
    _reader_handle: tokio::task::JoinHandle<()>,
}

impl WsSignalingChannel {
    /// Connects to `relay_url`.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::InvalidUrl`] if the URL is malformed or not ws/wss.
    /// - [`ChannelError::Timeout`] if the connection is not up within `timeout`.
    /// - [`ChannelError::Unreachable`] for network or handshake failures.
    pub async fn connect(relay_url: &str, timeout: Duration) -> Result<Self, ChannelError> {
        let url = validate_url(relay_url)?;

        let (ws_stream, _response) = tokio::time::timeout(timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| {
                tracing::warn!(url = relay_url, "relay connect timed out");
                ChannelError::Timeout
            })?
            .map_err(|e| {
                tracing::warn!(url = relay_url, err = %e, "relay connect failed");
                ChannelError::Unreachable(e.to_string())
            })?;
        tracing::info!(url = relay_url, "connected to relay");

        let (ws_sender, ws_reader) = ws_stream.split();
        let (tx, rx) = mpsc::channel(256);
        let connected = Arc::new(AtomicBool::new(true));
        let reader_handle = tokio::spawn(reader_loop(ws_reader, tx, Arc::clone(&connected)));

        Ok(Self {
            relay_url: relay_url.to_string(),
            ws_sender: Mutex::new(ws_sender),
            incoming: Mutex::new(rx),
            connected,
            _reader_handle: reader_handle,
        })
    }

    /// The relay URL this channel connected to.
    pub fn relay_url(&self) -> &str {
        &self.relay_url
    }

    /// Sends a close frame. Further sends fail with [`ChannelError::Closed`].
    pub async fn close(&self) {
        self.connected.store(false, Ordering::Relaxed);
        let mut sender = self.ws_sender.lock().await;
        if let Err(e) = sender.send(Message::Close(None)).await {
            tracing::debug!(err = %e, "close frame not sent");
        }
    }
}

impl SignalingChannel for WsSignalingChannel {
    async fn send(&self, msg: &ClientMessage) -> Result<(), ChannelError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(ChannelError::Closed);
        }
        let bytes = codec::encode(msg)?;
        let mut sender = self.ws_sender.lock().await;
        sender.send(Message::Binary(bytes.into())).await.map_err(|e| {
            tracing::warn!(err = %e, "relay send failed");
            self.connected.store(false, Ordering::Relaxed);
            ChannelError::Closed
        })
    }

    async fn recv(&self) -> Result<ServerMessage, ChannelError> {
        let mut rx = self.incoming.lock().await;
        rx.recv().await.ok_or(ChannelError::Closed)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

/// Reads frames until the socket closes. Malformed frames are skipped.
async fn reader_loop(
    mut ws_reader: WsReader,
    tx: mpsc::Sender<ServerMessage>,
    connected: Arc<AtomicBool>,
) {
    while let Some(frame) = ws_reader.next().await {
        match frame {
            Ok(Message::Binary(data)) => match codec::decode::<ServerMessage>(&data) {
                Ok(msg) => {
                    if tx.send(msg).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(err = %e, "malformed relay frame, skipping"),
            },
            Ok(Message::Close(_)) => {
                tracing::info!("relay closed the connection");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Text(_) | Message::Frame(_)) => {}
            Err(e) => {
                tracing::warn!(err = %e, "relay read error");
                break;
            }
        }
    }
    connected.store(false, Ordering::Relaxed);
    tracing::debug!("relay reader task exiting");
}

fn validate_url(relay_url: &str) -> Result<url::Url, ChannelError> {
    let invalid = |reason: String| ChannelError::InvalidUrl {
        url: relay_url.to_string(),
        reason,
    };
    let url = url::Url::parse(relay_url).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => return Err(invalid(format!("unsupported scheme {other}"))),
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}
