//! Call room registry for the relay server.
//!
//! The registry is the authority for room membership and host identity.
//! Every mutation runs under a single write lock, so racing joins and
//! leaves resolve to one total order and each outcome describes exactly
//! who must be told what.
//!
//! Host policy:
//! - the first participant of a room becomes host;
//! - when the host leaves, the earliest-joined remaining participant
//!   becomes host;
//! - only the host may transfer the role or end the meeting. Requests from
//!   anyone else are ignored.
//!
//! Rooms are ephemeral: a room exists while it has at least one participant
//! and is lost on relay restart.

use std::collections::HashMap;

use taskmeet_proto::call::{
    ConnectionId, MAX_DISPLAY_NAME_LEN, MAX_ROOM_ID_LEN, Participant,
};
use tokio::sync::RwLock;

/// Default maximum number of rooms the registry will hold.
pub const DEFAULT_MAX_ROOMS: usize = 1000;

/// Default maximum number of participants per room.
pub const DEFAULT_MAX_PARTICIPANTS: usize = 16;

/// Errors that can occur during room registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// The room identifier is empty or too long.
    #[error("invalid room id")]
    InvalidRoomId,
    /// The display name is empty or too long.
    #[error("invalid display name")]
    InvalidDisplayName,
    /// The connection is already a participant of a room.
    #[error("connection is already in room {0}")]
    AlreadyInRoom(String),
    /// The room has reached its participant limit.
    #[error("room is full (max {0} participants)")]
    RoomFull(usize),
    /// The registry has reached its maximum number of rooms.
    #[error("room registry is full (max {0} rooms)")]
    CapacityReached(usize),
    /// The connection is not in any room.
    #[error("not in a room")]
    NotInRoom,
    /// The signal target is not in the sender's room.
    #[error("participant {0} is not in this room")]
    UnknownParticipant(ConnectionId),
}

/// A live call room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRoom {
    /// Caller-supplied room identifier.
    pub room_id: String,
    /// Participants in join order.
    pub participants: Vec<Participant>,
    /// Current host; always one of `participants`.
    pub host_id: ConnectionId,
}

impl CallRoom {
    fn connection_ids(&self) -> Vec<ConnectionId> {
        self.participants
            .iter()
            .map(|p| p.connection_id.clone())
            .collect()
    }

    fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.participants
            .iter()
            .any(|p| &p.connection_id == connection_id)
    }
}

/// Result of a successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Participants present before the joiner, in join order.
    pub roster: Vec<Participant>,
    /// Host after the join.
    pub host_id: ConnectionId,
}

/// Result of a participant leaving or disconnecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// Room that was left.
    pub room_id: String,
    /// Participants still in the room, to be told about the departure.
    pub remaining: Vec<ConnectionId>,
    /// Set when the departed participant was host and a successor was chosen.
    pub new_host: Option<ConnectionId>,
}

impl LeaveOutcome {
    /// True when the departure emptied and destroyed the room.
    #[must_use]
    pub fn room_destroyed(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// Result of a host-only request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAction {
    /// The request was applied; `members` must be notified.
    Applied {
        /// Room the request applied to.
        room_id: String,
        /// Everyone to notify, in join order.
        members: Vec<ConnectionId>,
    },
    /// The requester is not host (or the target is invalid). Nothing changed.
    Ignored,
}

#[derive(Default)]
struct Inner {
    rooms: HashMap<String, CallRoom>,
    /// Connection → room it is in.
    membership: HashMap<ConnectionId, String>,
}

/// In-memory directory of live call rooms.
///
/// Thread-safe via [`RwLock`].
pub struct RoomRegistry {
    inner: RwLock<Inner>,
    max_rooms: usize,
    max_participants: usize,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    /// Creates a new, empty registry with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_ROOMS, DEFAULT_MAX_PARTICIPANTS)
    }

    /// Creates a new, empty registry with custom limits.
    #[must_use]
    pub fn with_limits(max_rooms: usize, max_participants: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_rooms,
            max_participants,
        }
    }

    /// Adds a connection to a room, creating the room if needed.
    ///
    /// The creator of a room becomes its host.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError`] if the ids are invalid, the connection is
    /// already in a room, or a capacity limit is hit.
    pub async fn join(
        &self,
        room_id: &str,
        connection_id: &ConnectionId,
        display_name: &str,
    ) -> Result<JoinOutcome, RoomError> {
        validate_room_id(room_id)?;
        validate_display_name(display_name)?;

        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        if let Some(current) = inner.membership.get(connection_id) {
            return Err(RoomError::AlreadyInRoom(current.clone()));
        }
        if !inner.rooms.contains_key(room_id) && inner.rooms.len() >= self.max_rooms {
            return Err(RoomError::CapacityReached(self.max_rooms));
        }

        let participant = Participant {
            connection_id: connection_id.clone(),
            display_name: display_name.to_string(),
        };
        let room = inner
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| CallRoom {
                room_id: room_id.to_string(),
                participants: Vec::new(),
                host_id: connection_id.clone(),
            });
        if room.participants.len() >= self.max_participants {
            return Err(RoomError::RoomFull(self.max_participants));
        }

        let roster = room.participants.clone();
        room.participants.push(participant);
        let host_id = room.host_id.clone();
        inner
            .membership
            .insert(connection_id.clone(), room_id.to_string());
        drop(guard);

        tracing::info!(
            room_id = %room_id,
            connection_id = %connection_id,
            participants = roster.len() + 1,
            "participant joined"
        );
        Ok(JoinOutcome { roster, host_id })
    }

    /// Removes a connection from its room.
    ///
    /// Returns `None` if the connection was not in a room. Destroys the room
    /// when the last participant leaves.
    pub async fn leave(&self, connection_id: &ConnectionId) -> Option<LeaveOutcome> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let room_id = inner.membership.remove(connection_id)?;
        let room = inner.rooms.get_mut(&room_id)?;
        room.participants
            .retain(|p| &p.connection_id != connection_id);

        let new_host = if room.participants.is_empty() {
            None
        } else if &room.host_id == connection_id {
            // Earliest remaining joiner inherits the room.
            let successor = room.participants[0].connection_id.clone();
            room.host_id = successor.clone();
            Some(successor)
        } else {
            None
        };
        let remaining = room.connection_ids();
        if remaining.is_empty() {
            inner.rooms.remove(&room_id);
            tracing::info!(room_id = %room_id, "room empty, destroyed");
        }
        drop(guard);

        if let Some(host) = &new_host {
            tracing::info!(room_id = %room_id, host_id = %host, "host reassigned");
        }
        Some(LeaveOutcome {
            room_id,
            remaining,
            new_host,
        })
    }

    /// Moves the host role from `requester` to `target`.
    ///
    /// Ignored unless `requester` is the current host and `target` is
    /// another participant of the same room.
    pub async fn transfer_host(
        &self,
        requester: &ConnectionId,
        target: &ConnectionId,
    ) -> HostAction {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let Some(room_id) = inner.membership.get(requester) else {
            return HostAction::Ignored;
        };
        let Some(room) = inner.rooms.get_mut(room_id) else {
            return HostAction::Ignored;
        };
        if &room.host_id != requester || requester == target || !room.contains(target) {
            tracing::debug!(
                room_id = %room.room_id,
                requester = %requester,
                target = %target,
                "host transfer ignored"
            );
            return HostAction::Ignored;
        }
        room.host_id = target.clone();
        tracing::info!(room_id = %room.room_id, host_id = %target, "host transferred");
        HostAction::Applied {
            room_id: room.room_id.clone(),
            members: room.connection_ids(),
        }
    }

    /// Ends the requester's meeting, removing the room and all memberships.
    ///
    /// Ignored unless `requester` is the current host.
    pub async fn end_meeting(&self, requester: &ConnectionId) -> HostAction {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let Some(room_id) = inner.membership.get(requester).cloned() else {
            return HostAction::Ignored;
        };
        let is_host = inner
            .rooms
            .get(&room_id)
            .is_some_and(|room| &room.host_id == requester);
        if !is_host {
            tracing::debug!(room_id = %room_id, requester = %requester, "end meeting ignored");
            return HostAction::Ignored;
        }
        let Some(room) = inner.rooms.remove(&room_id) else {
            return HostAction::Ignored;
        };
        let members = room.connection_ids();
        for member in &members {
            inner.membership.remove(member);
        }
        drop(guard);

        tracing::info!(room_id = %room_id, participants = members.len(), "meeting ended");
        HostAction::Applied { room_id, members }
    }

    /// Returns the participants of the connection's room, in join order.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::NotInRoom`] if the connection is not in a room.
    pub async fn room_members(
        &self,
        connection_id: &ConnectionId,
    ) -> Result<Vec<Participant>, RoomError> {
        let inner = self.inner.read().await;
        inner
            .membership
            .get(connection_id)
            .and_then(|room_id| inner.rooms.get(room_id))
            .map(|room| room.participants.clone())
            .ok_or(RoomError::NotInRoom)
    }

    /// Checks that `to` shares a room with `from`, for signal routing.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::NotInRoom`] if `from` is not in a room, or
    /// [`RoomError::UnknownParticipant`] if `to` is not in the same room.
    pub async fn check_peer(
        &self,
        from: &ConnectionId,
        to: &ConnectionId,
    ) -> Result<(), RoomError> {
        let inner = self.inner.read().await;
        let room_id = inner.membership.get(from).ok_or(RoomError::NotInRoom)?;
        if inner.membership.get(to) == Some(room_id) && from != to {
            Ok(())
        } else {
            Err(RoomError::UnknownParticipant(to.clone()))
        }
    }

    /// Returns a snapshot of a room, if it exists.
    pub async fn get(&self, room_id: &str) -> Option<CallRoom> {
        let inner = self.inner.read().await;
        inner.rooms.get(room_id).cloned()
    }

    /// Returns the number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.inner.read().await.rooms.len()
    }
}

fn validate_room_id(room_id: &str) -> Result<(), RoomError> {
    let len = room_id.chars().count();
    if room_id.trim().is_empty() || len > MAX_ROOM_ID_LEN {
        return Err(RoomError::InvalidRoomId);
    }
    Ok(())
}

fn validate_display_name(name: &str) -> Result<(), RoomError> {
    let len = name.chars().count();
    if name.trim().is_empty() || len > MAX_DISPLAY_NAME_LEN {
        return Err(RoomError::InvalidDisplayName);
    }
    Ok(())
}
