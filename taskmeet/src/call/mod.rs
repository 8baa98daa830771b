//! Multi-party call rooms.
//!
//! [`CallSession`] is the room state machine: local actions return the
//! [`ClientMessage`](taskmeet_proto::call::ClientMessage)s to send, and relay
//! messages return [`CallEvent`]s for the user plus any handshake replies.
//! [`CallClient`] drives a session over a [`SignalingChannel`].

pub mod channel;
pub mod client;
pub mod media;
pub mod peer;
pub mod session;

pub use channel::{ChannelError, SignalingChannel, WsSignalingChannel};
pub use client::CallClient;
pub use media::{MediaDevices, MediaError, NoDevices, VirtualDevices};
pub use peer::{LinkRole, LinkState, PeerLink};
pub use session::{CallSession, Reaction};

use taskmeet_proto::call::{ConnectionId, Participant};
use taskmeet_proto::codec::CodecError;
use taskmeet_proto::signal::TrackKind;

/// Errors from call operations.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// The operation needs an active room.
    #[error("not in a room")]
    NotInRoom,

    /// `join` was called while joining or joined.
    #[error("already in room {0}")]
    AlreadyJoined(String),

    /// Room id is empty or too long.
    #[error("invalid room id")]
    InvalidRoomId,

    /// Display name is empty or too long.
    #[error("invalid display name")]
    InvalidDisplayName,

    /// Chat text is empty or too long.
    #[error("chat message must be 1 to {max} characters")]
    InvalidChat {
        /// Maximum accepted length.
        max: usize,
    },

    /// No participant with this id in the room.
    #[error("unknown participant {0}")]
    UnknownPeer(ConnectionId),

    /// The relay refused the join.
    #[error("relay rejected join: {0}")]
    JoinRejected(String),

    /// The relay did not answer the join in time.
    #[error("timed out waiting for the relay to confirm the join")]
    JoinTimeout,

    /// Encoding a handshake failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The signaling channel failed.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Something the user should see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    /// The relay confirmed the join.
    Joined {
        /// Room joined.
        room_id: String,
        /// Our connection id.
        self_id: ConnectionId,
        /// Current host.
        host_id: ConnectionId,
        /// Others already present, in join order.
        roster: Vec<Participant>,
    },
    /// Someone joined after us.
    ParticipantJoined(Participant),
    /// Someone left or disconnected.
    ParticipantLeft {
        /// Who left.
        connection_id: ConnectionId,
        /// Their display name, if still known.
        display_name: Option<String>,
    },
    /// Host moved to another participant.
    HostChanged {
        /// The new host.
        host_id: ConnectionId,
        /// True if we are now the host.
        is_self: bool,
    },
    /// Handshake with a participant completed.
    LinkUp(ConnectionId),
    /// Handshake with a participant failed. Other links are unaffected.
    LinkFailed {
        /// The remote participant.
        peer: ConnectionId,
        /// What went wrong.
        reason: String,
    },
    /// A participant's track set changed.
    RemoteTracks {
        /// The remote participant.
        peer: ConnectionId,
        /// Tracks they now send.
        tracks: Vec<TrackKind>,
    },
    /// Our own track set changed.
    LocalTracks(Vec<TrackKind>),
    /// A capture device could not be opened.
    MediaFailed(MediaError),
    /// Room chat message.
    Chat {
        /// Sender.
        from: ConnectionId,
        /// Sender's display name.
        display_name: String,
        /// Message text.
        text: String,
    },
    /// The host ended the meeting.
    MeetingEnded,
    /// The relay connection dropped. All links are gone; reconnect or exit.
    RelayLost,
    /// The relay reported an error.
    RelayError(String),
}
