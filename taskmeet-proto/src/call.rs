//! Call room relay protocol.
//!
//! Clients send [`ClientMessage`]s to the relay and receive
//! [`ServerMessage`]s back, each postcard-encoded in one WebSocket binary
//! frame. The relay owns the authoritative roster and host identity; clients
//! treat every roster or host event from the relay as overriding their local
//! view.
//!
//! Signal payloads are opaque to the relay. It only reads the routing
//! fields (`to`) and stamps `from` with the sender's registered connection.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum length of a display name in characters.
pub const MAX_DISPLAY_NAME_LEN: usize = 64;

/// Maximum length of a room identifier in characters.
pub const MAX_ROOM_ID_LEN: usize = 128;

/// Maximum length of a chat message in characters.
pub const MAX_CHAT_LEN: usize = 2000;

/// Relay-assigned identifier of one client connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Creates a fresh connection identifier (UUID v7).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Wraps an existing identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One entry of a room roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Relay-assigned connection identifier.
    pub connection_id: ConnectionId,
    /// Name shown to other participants.
    pub display_name: String,
}

impl Participant {
    /// Convenience constructor.
    pub fn new(connection_id: impl Into<ConnectionId>, display_name: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Messages a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Join (or create) a room. Must be the first message on a connection.
    Join {
        /// Caller-supplied room identifier.
        room_id: String,
        /// Name to show to other participants.
        display_name: String,
    },
    /// Leave the current room voluntarily.
    Leave,
    /// Hand the host role to another participant. Host only.
    TransferHost {
        /// Connection that should become host.
        target: ConnectionId,
    },
    /// End the meeting for everyone. Host only.
    EndMeeting,
    /// Forward an opaque handshake payload to one participant.
    Signal {
        /// Recipient connection.
        to: ConnectionId,
        /// Opaque bytes, never inspected by the relay.
        payload: Vec<u8>,
    },
    /// Send a chat line to every participant in the room.
    Chat {
        /// Message text.
        text: String,
    },
}

/// Messages the relay sends to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Reply to [`ClientMessage::Join`].
    Joined {
        /// The joined room.
        room_id: String,
        /// Connection id the relay assigned to this client.
        connection_id: ConnectionId,
        /// Participants already present, in join order (excluding the joiner).
        roster: Vec<Participant>,
        /// Current host. The first joiner is host of a new room.
        host_id: ConnectionId,
    },
    /// Someone joined the room after us.
    PeerJoined {
        /// The new participant.
        participant: Participant,
    },
    /// Someone left or disconnected.
    PeerLeft {
        /// The departed connection.
        connection_id: ConnectionId,
    },
    /// The host role moved.
    HostChanged {
        /// The new host.
        host_id: ConnectionId,
    },
    /// The host ended the meeting. Terminal for the room.
    MeetingEnded,
    /// A relayed handshake payload.
    Signal {
        /// Sender connection, stamped by the relay.
        from: ConnectionId,
        /// Opaque bytes.
        payload: Vec<u8>,
    },
    /// A relayed chat line.
    Chat {
        /// Sender connection, stamped by the relay.
        from: ConnectionId,
        /// Sender display name at send time.
        display_name: String,
        /// Message text.
        text: String,
    },
    /// The relay rejected a request.
    Error {
        /// Human-readable reason.
        reason: String,
    },
}
