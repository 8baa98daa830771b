//! Relay server core: shared state, WebSocket handler, and message routing.
//!
//! Every WebSocket connection gets a relay-assigned [`ConnectionId`]. A
//! connection joins at most one room at a time; the [`RoomRegistry`]
//! decides membership and host identity, and this module fans the results
//! out to the affected connections.
//!
//! The relay never interprets signal payloads. It checks that sender and
//! recipient share a room, stamps `from` with the sender's own id, and
//! forwards the bytes.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use taskmeet_proto::call::{
    ClientMessage, ConnectionId, MAX_CHAT_LEN, Participant, ServerMessage,
};
use taskmeet_proto::codec;
use tokio::sync::{RwLock, mpsc};

use crate::rooms::{HostAction, RoomRegistry};

/// Default maximum allowed signal payload size in bytes (64 KB).
const DEFAULT_MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Shared relay server state holding the connection table and room registry.
pub struct RelayState {
    /// Maps `ConnectionId` to a channel sender for delivering WebSocket messages.
    connections: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<Message>>>,
    /// Room membership and host authority.
    pub rooms: RoomRegistry,
    /// Maximum allowed signal payload size in bytes.
    max_payload_size: usize,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    /// Creates a new relay state with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DEFAULT_MAX_PAYLOAD_SIZE, RoomRegistry::new())
    }

    /// Creates a new relay state with a custom payload limit and registry.
    #[must_use]
    pub fn with_config(max_payload_size: usize, rooms: RoomRegistry) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            rooms,
            max_payload_size,
        }
    }

    /// Registers a connection, storing the sender half of its channel.
    pub async fn register(
        &self,
        connection_id: &ConnectionId,
        sender: mpsc::UnboundedSender<Message>,
    ) {
        let mut conns = self.connections.write().await;
        conns.insert(connection_id.clone(), sender);
    }

    /// Removes a connection, returning the sender if it existed.
    pub async fn unregister(
        &self,
        connection_id: &ConnectionId,
    ) -> Option<mpsc::UnboundedSender<Message>> {
        let mut conns = self.connections.write().await;
        conns.remove(connection_id)
    }

    /// Returns a clone of the sender for the given connection, if registered.
    pub async fn get_sender(
        &self,
        connection_id: &ConnectionId,
    ) -> Option<mpsc::UnboundedSender<Message>> {
        let conns = self.connections.read().await;
        conns.get(connection_id).cloned()
    }

    /// Returns the number of open connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a WebSocket Close frame to all connected clients.
    ///
    /// Each client's reader sees the close and treats it as a dropped relay.
    pub async fn close_all_connections(&self) {
        let conns = self.connections.read().await;
        for (connection_id, sender) in conns.iter() {
            tracing::info!(connection_id = %connection_id, "sending close frame");
            let _ = sender.send(Message::Close(None));
        }
    }
}

/// Handles an upgraded WebSocket connection for a single client.
///
/// The connection lifecycle:
/// 1. Assign a connection id and register the outbound channel.
/// 2. Spawn a writer task draining the channel into the socket.
/// 3. Read and dispatch [`ClientMessage`]s until the socket closes.
/// 4. On disconnect, leave the room (as an involuntary leave) and unregister.
pub async fn handle_socket(socket: WebSocket, state: Arc<RelayState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let connection_id = ConnectionId::generate();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    state.register(&connection_id, tx).await;
    tracing::info!(connection_id = %connection_id, "connection opened");

    let writer_id = connection_id.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(connection_id = %writer_id, "WebSocket write failed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let reader_id = connection_id.clone();
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    handle_binary_message(&reader_id, &data, &reader_state).await;
                }
                Message::Close(_) => {
                    tracing::info!(connection_id = %reader_id, "received close frame");
                    break;
                }
                _ => {
                    // Ignore text, ping, pong frames.
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    leave_room(&state, &connection_id).await;
    state.unregister(&connection_id).await;
    tracing::info!(connection_id = %connection_id, "connection closed");
}

/// Decodes and dispatches one binary frame from a connection.
async fn handle_binary_message(connection_id: &ConnectionId, data: &[u8], state: &Arc<RelayState>) {
    let msg: ClientMessage = match codec::decode(data) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(connection_id = %connection_id, error = %e, "failed to decode message");
            send_error(state, connection_id, format!("malformed message: {e}")).await;
            return;
        }
    };

    match msg {
        ClientMessage::Join {
            room_id,
            display_name,
        } => handle_join(state, connection_id, &room_id, &display_name).await,
        ClientMessage::Leave => leave_room(state, connection_id).await,
        ClientMessage::TransferHost { target } => {
            if let HostAction::Applied { members, .. } =
                state.rooms.transfer_host(connection_id, &target).await
            {
                let msg = ServerMessage::HostChanged { host_id: target };
                broadcast(state, &members, &msg).await;
            }
        }
        ClientMessage::EndMeeting => {
            if let HostAction::Applied { members, .. } =
                state.rooms.end_meeting(connection_id).await
            {
                broadcast(state, &members, &ServerMessage::MeetingEnded).await;
            }
        }
        ClientMessage::Signal { to, payload } => {
            handle_signal(state, connection_id, to, payload).await;
        }
        ClientMessage::Chat { text } => handle_chat(state, connection_id, text).await,
    }
}

/// Joins a room and announces the newcomer to everyone already there.
async fn handle_join(
    state: &Arc<RelayState>,
    connection_id: &ConnectionId,
    room_id: &str,
    display_name: &str,
) {
    match state.rooms.join(room_id, connection_id, display_name).await {
        Ok(outcome) => {
            let joined = ServerMessage::Joined {
                room_id: room_id.to_string(),
                connection_id: connection_id.clone(),
                roster: outcome.roster.clone(),
                host_id: outcome.host_id,
            };
            send_to(state, connection_id, &joined).await;

            let announce = ServerMessage::PeerJoined {
                participant: Participant {
                    connection_id: connection_id.clone(),
                    display_name: display_name.to_string(),
                },
            };
            let existing: Vec<ConnectionId> = outcome
                .roster
                .into_iter()
                .map(|p| p.connection_id)
                .collect();
            broadcast(state, &existing, &announce).await;
        }
        Err(e) => {
            tracing::warn!(
                connection_id = %connection_id,
                room_id = %room_id,
                error = %e,
                "join rejected"
            );
            send_error(state, connection_id, e.to_string()).await;
        }
    }
}

/// Removes a connection from its room and tells the remaining participants.
async fn leave_room(state: &Arc<RelayState>, connection_id: &ConnectionId) {
    let Some(outcome) = state.rooms.leave(connection_id).await else {
        return;
    };
    let left = ServerMessage::PeerLeft {
        connection_id: connection_id.clone(),
    };
    broadcast(state, &outcome.remaining, &left).await;
    if let Some(host_id) = outcome.new_host {
        broadcast(state, &outcome.remaining, &ServerMessage::HostChanged { host_id }).await;
    }
}

/// Forwards a signal payload to one participant of the sender's room.
async fn handle_signal(
    state: &Arc<RelayState>,
    from: &ConnectionId,
    to: ConnectionId,
    payload: Vec<u8>,
) {
    if payload.len() > state.max_payload_size {
        tracing::warn!(
            connection_id = %from,
            size = payload.len(),
            max = state.max_payload_size,
            "signal payload exceeds size limit"
        );
        let reason = format!(
            "payload too large: {} bytes (max {})",
            payload.len(),
            state.max_payload_size
        );
        send_error(state, from, reason).await;
        return;
    }
    if let Err(e) = state.rooms.check_peer(from, &to).await {
        tracing::debug!(from = %from, to = %to, error = %e, "signal not routed");
        send_error(state, from, e.to_string()).await;
        return;
    }

    tracing::debug!(from = %from, to = %to, payload_len = payload.len(), "routing signal");
    let msg = ServerMessage::Signal {
        from: from.clone(),
        payload,
    };
    send_to(state, &to, &msg).await;
}

/// Relays a chat line to every participant of the sender's room, sender included.
async fn handle_chat(state: &Arc<RelayState>, from: &ConnectionId, text: String) {
    if text.trim().is_empty() || text.chars().count() > MAX_CHAT_LEN {
        send_error(state, from, "invalid chat message".to_string()).await;
        return;
    }
    let members = match state.rooms.room_members(from).await {
        Ok(m) => m,
        Err(e) => {
            send_error(state, from, e.to_string()).await;
            return;
        }
    };
    let display_name = members
        .iter()
        .find(|p| &p.connection_id == from)
        .map(|p| p.display_name.clone())
        .unwrap_or_default();
    let recipients: Vec<ConnectionId> = members.into_iter().map(|p| p.connection_id).collect();
    let msg = ServerMessage::Chat {
        from: from.clone(),
        display_name,
        text,
    };
    broadcast(state, &recipients, &msg).await;
}

/// Sends one message to each listed connection.
async fn broadcast(state: &Arc<RelayState>, recipients: &[ConnectionId], msg: &ServerMessage) {
    let bytes = match codec::encode(msg) {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(error = %e, "failed to encode broadcast");
            return;
        }
    };
    for recipient in recipients {
        if let Some(sender) = state.get_sender(recipient).await
            && sender.send(Message::Binary(bytes.clone().into())).is_err()
        {
            tracing::warn!(connection_id = %recipient, "broadcast delivery failed");
        }
    }
}

/// Sends a message to a single connection, if it is still open.
async fn send_to(state: &Arc<RelayState>, connection_id: &ConnectionId, msg: &ServerMessage) {
    if let Some(sender) = state.get_sender(connection_id).await
        && let Ok(bytes) = codec::encode(msg)
    {
        let _ = sender.send(Message::Binary(bytes.into()));
    }
}

async fn send_error(state: &Arc<RelayState>, connection_id: &ConnectionId, reason: String) {
    send_to(state, connection_id, &ServerMessage::Error { reason }).await;
}

/// Starts the relay server on the given address and returns the bound address
/// and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(RelayState::new())).await
}

/// Starts the relay server with a pre-configured [`RelayState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<RelayState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "relay server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<RelayState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
