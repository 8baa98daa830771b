//! Call room state machine.
//!
//! The session never performs I/O. Local actions return the messages to
//! send to the relay; relay messages are fed to [`CallSession::handle`],
//! which returns a [`Reaction`]. Roster and host information from the relay
//! always replaces whatever the session believed before.
//!
//! Joins may race at the relay, so room traffic can arrive before our own
//! `Joined`. Such messages are held while joining and replayed, in arrival
//! order, right after the roster is installed.

use std::collections::{BTreeSet, HashMap};

use taskmeet_proto::call::{
    ClientMessage, ConnectionId, MAX_CHAT_LEN, MAX_DISPLAY_NAME_LEN, MAX_ROOM_ID_LEN,
    Participant, ServerMessage,
};
use taskmeet_proto::codec;
use taskmeet_proto::signal::{Handshake, TrackKind};

use super::peer::PeerLink;
use super::{CallError, CallEvent, MediaDevices};

/// Result of feeding one input to the session.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reaction {
    /// Events for the user, in order.
    pub events: Vec<CallEvent>,
    /// Messages to send to the relay, in order.
    pub outgoing: Vec<ClientMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    Joining { room_id: String },
    InRoom { room_id: String, self_id: ConnectionId },
}

/// Client side of one call room.
pub struct CallSession {
    display_name: String,
    phase: Phase,
    host_id: Option<ConnectionId>,
    /// Other participants in join order.
    roster: Vec<Participant>,
    links: HashMap<ConnectionId, PeerLink>,
    local_tracks: BTreeSet<TrackKind>,
    media: Box<dyn MediaDevices>,
    /// Room traffic received before our `Joined`.
    held: Vec<ServerMessage>,
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("display_name", &self.display_name)
            .field("phase", &self.phase)
            .field("host_id", &self.host_id)
            .field("roster", &self.roster.len())
            .field("links", &self.links.len())
            .field("local_tracks", &self.local_tracks)
            .field("held", &self.held.len())
            .finish_non_exhaustive()
    }
}

impl CallSession {
    /// Creates an idle session.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::InvalidDisplayName`] if the name is blank or
    /// longer than [`MAX_DISPLAY_NAME_LEN`].
    pub fn new(display_name: &str, media: Box<dyn MediaDevices>) -> Result<Self, CallError> {
        let display_name = display_name.trim();
        if display_name.is_empty() || display_name.chars().count() > MAX_DISPLAY_NAME_LEN {
            return Err(CallError::InvalidDisplayName);
        }
        Ok(Self {
            display_name: display_name.to_string(),
            phase: Phase::Idle,
            host_id: None,
            roster: Vec::new(),
            links: HashMap::new(),
            local_tracks: BTreeSet::new(),
            media,
            held: Vec::new(),
        })
    }

    /// Starts joining a room. The session is in the room once the relay's
    /// `Joined` reply is handled.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::AlreadyJoined`] if joining or joined, or
    /// [`CallError::InvalidRoomId`].
    pub fn join(&mut self, room_id: &str) -> Result<ClientMessage, CallError> {
        match &self.phase {
            Phase::Idle => {}
            Phase::Joining { room_id } | Phase::InRoom { room_id, .. } => {
                return Err(CallError::AlreadyJoined(room_id.clone()));
            }
        }
        let room_id = room_id.trim();
        if room_id.is_empty() || room_id.len() > MAX_ROOM_ID_LEN {
            return Err(CallError::InvalidRoomId);
        }
        self.phase = Phase::Joining {
            room_id: room_id.to_string(),
        };
        tracing::info!(room_id = %room_id, display_name = %self.display_name, "joining room");
        Ok(ClientMessage::Join {
            room_id: room_id.to_string(),
            display_name: self.display_name.clone(),
        })
    }

    /// Leaves the room, tearing down every link and releasing devices.
    ///
    /// Returns `None` if not in a room.
    pub fn leave(&mut self) -> Option<ClientMessage> {
        if self.phase == Phase::Idle {
            return None;
        }
        tracing::info!(room_id = ?self.room_id(), "leaving room");
        self.reset();
        Some(ClientMessage::Leave)
    }

    /// Hands the host role to another participant. Does nothing unless we
    /// are the host and `target` is in the room.
    #[must_use]
    pub fn transfer_host(&self, target: &ConnectionId) -> Option<ClientMessage> {
        if !self.is_host() {
            tracing::debug!(target = %target, "transfer host ignored, not host");
            return None;
        }
        if !self.roster.iter().any(|p| &p.connection_id == target) {
            tracing::debug!(target = %target, "transfer host ignored, unknown target");
            return None;
        }
        Some(ClientMessage::TransferHost {
            target: target.clone(),
        })
    }

    /// Ends the meeting for everyone. Does nothing unless we are the host.
    ///
    /// Local teardown happens when the relay's `MeetingEnded` arrives.
    #[must_use]
    pub fn end_meeting(&self) -> Option<ClientMessage> {
        if !self.is_host() {
            tracing::debug!("end meeting ignored, not host");
            return None;
        }
        Some(ClientMessage::EndMeeting)
    }

    /// Sends an opaque payload to exactly one participant.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::NotInRoom`] or [`CallError::UnknownPeer`].
    pub fn relay_signal(
        &self,
        to: &ConnectionId,
        payload: Vec<u8>,
    ) -> Result<ClientMessage, CallError> {
        self.require_room()?;
        if !self.roster.iter().any(|p| &p.connection_id == to) {
            return Err(CallError::UnknownPeer(to.clone()));
        }
        Ok(ClientMessage::Signal {
            to: to.clone(),
            payload,
        })
    }

    /// Sends a chat message to every participant, ourselves included.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::NotInRoom`] or [`CallError::InvalidChat`].
    pub fn broadcast_chat(&self, text: &str) -> Result<ClientMessage, CallError> {
        self.require_room()?;
        let text = text.trim();
        if text.is_empty() || text.chars().count() > MAX_CHAT_LEN {
            return Err(CallError::InvalidChat { max: MAX_CHAT_LEN });
        }
        Ok(ClientMessage::Chat {
            text: text.to_string(),
        })
    }

    /// Turns a local track on or off.
    ///
    /// Device failures are reported as [`CallEvent::MediaFailed`] and leave
    /// the track set unchanged. Connected links are renegotiated in place.
    pub fn set_track(&mut self, kind: TrackKind, enabled: bool) -> Reaction {
        let mut reaction = Reaction::default();
        if enabled {
            if self.local_tracks.contains(&kind) {
                return reaction;
            }
            if let Err(e) = self.media.acquire(kind) {
                tracing::warn!(kind = %kind, error = %e, "capture device unavailable");
                reaction.events.push(CallEvent::MediaFailed(e));
                return reaction;
            }
            self.local_tracks.insert(kind);
        } else {
            if !self.local_tracks.remove(&kind) {
                return reaction;
            }
            self.media.release(kind);
        }

        let local = self.tracks();
        reaction.events.push(CallEvent::LocalTracks(local.clone()));
        for p in &self.roster {
            if let Some(link) = self.links.get_mut(&p.connection_id)
                && let Some(offer) = link.renegotiate(&local)
            {
                send_handshake(&mut reaction, link, offer);
            }
        }
        reaction
    }

    /// The relay connection dropped. Every link is stale; the session
    /// returns to idle without contacting anyone.
    pub fn relay_lost(&mut self) -> Reaction {
        tracing::warn!(
            room_id = ?self.room_id(),
            links = self.links.len(),
            "relay connection lost"
        );
        self.reset();
        Reaction {
            events: vec![CallEvent::RelayLost],
            outgoing: Vec::new(),
        }
    }

    /// Applies one message from the relay.
    pub fn handle(&mut self, msg: ServerMessage) -> Reaction {
        let mut reaction = Reaction::default();
        self.apply(&mut reaction, msg);
        reaction
    }

    fn apply(&mut self, reaction: &mut Reaction, msg: ServerMessage) {
        if matches!(self.phase, Phase::Joining { .. })
            && !matches!(msg, ServerMessage::Joined { .. } | ServerMessage::Error { .. })
        {
            tracing::debug!(held = self.held.len() + 1, "room message before join, holding");
            self.held.push(msg);
            return;
        }
        match msg {
            ServerMessage::Joined {
                room_id,
                connection_id,
                roster,
                host_id,
            } => self.on_joined(reaction, room_id, connection_id, roster, host_id),
            ServerMessage::PeerJoined { participant } => {
                self.on_peer_joined(reaction, participant);
            }
            ServerMessage::PeerLeft { connection_id } => {
                self.on_peer_left(reaction, connection_id);
            }
            ServerMessage::HostChanged { host_id } => {
                if !self.is_in_room() {
                    tracing::debug!(host_id = %host_id, "host change outside a room dropped");
                    return;
                }
                let is_self = self.self_id() == Some(&host_id);
                tracing::info!(host_id = %host_id, is_self, "host changed");
                self.host_id = Some(host_id.clone());
                reaction.events.push(CallEvent::HostChanged { host_id, is_self });
            }
            ServerMessage::MeetingEnded => {
                tracing::info!(room_id = ?self.room_id(), "meeting ended by host");
                self.reset();
                reaction.events.push(CallEvent::MeetingEnded);
            }
            ServerMessage::Signal { from, payload } => self.on_signal(reaction, &from, &payload),
            ServerMessage::Chat {
                from,
                display_name,
                text,
            } => reaction.events.push(CallEvent::Chat {
                from,
                display_name,
                text,
            }),
            ServerMessage::Error { reason } => {
                if let Phase::Joining { room_id } = &self.phase {
                    tracing::warn!(room_id = %room_id, reason = %reason, "join rejected");
                    self.phase = Phase::Idle;
                    self.held.clear();
                } else {
                    tracing::warn!(reason = %reason, "relay error");
                }
                reaction.events.push(CallEvent::RelayError(reason));
            }
        }
    }

    fn on_joined(
        &mut self,
        reaction: &mut Reaction,
        room_id: String,
        self_id: ConnectionId,
        roster: Vec<Participant>,
        host_id: ConnectionId,
    ) {
        if !matches!(self.phase, Phase::Joining { .. }) {
            tracing::warn!(room_id = %room_id, "joined without a pending join");
        }
        self.close_links();
        let roster: Vec<Participant> = roster
            .into_iter()
            .filter(|p| p.connection_id != self_id)
            .collect();
        tracing::info!(
            room_id = %room_id,
            connection_id = %self_id,
            host_id = %host_id,
            participants = roster.len() + 1,
            "joined room"
        );

        self.phase = Phase::InRoom {
            room_id: room_id.clone(),
            self_id: self_id.clone(),
        };
        self.host_id = Some(host_id.clone());
        self.roster.clone_from(&roster);
        reaction.events.push(CallEvent::Joined {
            room_id,
            self_id,
            host_id,
            roster,
        });

        let local = self.tracks();
        for p in &self.roster {
            let (mut link, offer) = PeerLink::offering(p.connection_id.clone(), &local);
            send_handshake(reaction, &mut link, offer);
            self.links.insert(p.connection_id.clone(), link);
        }

        for msg in std::mem::take(&mut self.held) {
            self.apply(reaction, msg);
        }
    }

    fn on_peer_joined(&mut self, reaction: &mut Reaction, participant: Participant) {
        let Phase::InRoom { self_id, .. } = &self.phase else {
            return;
        };
        let id = participant.connection_id.clone();
        if &id == self_id || self.roster.iter().any(|p| p.connection_id == id) {
            return;
        }
        tracing::info!(
            connection_id = %id,
            display_name = %participant.display_name,
            "participant joined"
        );
        self.links.insert(id.clone(), PeerLink::answering(id));
        self.roster.push(participant.clone());
        reaction.events.push(CallEvent::ParticipantJoined(participant));
    }

    fn on_peer_left(&mut self, reaction: &mut Reaction, connection_id: ConnectionId) {
        let idx = self.roster.iter().position(|p| p.connection_id == connection_id);
        let display_name = idx.map(|i| self.roster.remove(i).display_name);
        if let Some(mut link) = self.links.remove(&connection_id) {
            link.close();
        }
        if display_name.is_none() {
            return;
        }
        tracing::info!(connection_id = %connection_id, "participant left");
        reaction.events.push(CallEvent::ParticipantLeft {
            connection_id,
            display_name,
        });
    }

    fn on_signal(&mut self, reaction: &mut Reaction, from: &ConnectionId, payload: &[u8]) {
        let local = self.tracks();
        let Some(link) = self.links.get_mut(from) else {
            tracing::debug!(from = %from, "signal from unknown participant dropped");
            return;
        };
        let step = match codec::decode::<Handshake>(payload) {
            Ok(step) => step,
            Err(e) => {
                tracing::warn!(from = %from, error = %e, "malformed handshake");
                link.fail();
                reaction.events.push(CallEvent::LinkFailed {
                    peer: from.clone(),
                    reason: e.to_string(),
                });
                return;
            }
        };
        match link.receive(step, &local) {
            Ok(update) => {
                if update.connected {
                    tracing::debug!(peer = %from, "link connected");
                    reaction.events.push(CallEvent::LinkUp(from.clone()));
                }
                if update.remote_changed {
                    reaction.events.push(CallEvent::RemoteTracks {
                        peer: from.clone(),
                        tracks: link.remote_tracks().to_vec(),
                    });
                }
                if let Some(reply) = update.reply {
                    send_handshake(reaction, link, reply);
                }
                // Tracks may have changed while the handshake was in progress.
                if let Some(offer) = link.renegotiate(&local) {
                    send_handshake(reaction, link, offer);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "handshake failed");
                link.fail();
                reaction.events.push(CallEvent::LinkFailed {
                    peer: from.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    fn require_room(&self) -> Result<(), CallError> {
        match self.phase {
            Phase::InRoom { .. } => Ok(()),
            _ => Err(CallError::NotInRoom),
        }
    }

    fn close_links(&mut self) {
        for link in self.links.values_mut() {
            link.close();
        }
        self.links.clear();
    }

    fn reset(&mut self) {
        self.close_links();
        self.roster.clear();
        self.host_id = None;
        self.phase = Phase::Idle;
        self.held.clear();
        for kind in std::mem::take(&mut self.local_tracks) {
            self.media.release(kind);
        }
    }

    fn tracks(&self) -> Vec<TrackKind> {
        self.local_tracks.iter().copied().collect()
    }

    /// Room we are in or joining.
    #[must_use]
    pub fn room_id(&self) -> Option<&str> {
        match &self.phase {
            Phase::Idle => None,
            Phase::Joining { room_id } | Phase::InRoom { room_id, .. } => Some(room_id),
        }
    }

    /// Our connection id once joined.
    #[must_use]
    pub const fn self_id(&self) -> Option<&ConnectionId> {
        match &self.phase {
            Phase::InRoom { self_id, .. } => Some(self_id),
            _ => None,
        }
    }

    #[must_use]
    pub const fn host_id(&self) -> Option<&ConnectionId> {
        self.host_id.as_ref()
    }

    /// True if we are the room's host.
    #[must_use]
    pub fn is_host(&self) -> bool {
        self.self_id().is_some() && self.self_id() == self.host_id.as_ref()
    }

    #[must_use]
    pub const fn is_in_room(&self) -> bool {
        matches!(self.phase, Phase::InRoom { .. })
    }

    /// Other participants in join order.
    #[must_use]
    pub fn roster(&self) -> &[Participant] {
        &self.roster
    }

    /// Display name of a participant.
    #[must_use]
    pub fn display_name_of(&self, id: &ConnectionId) -> Option<&str> {
        if self.self_id() == Some(id) {
            return Some(&self.display_name);
        }
        self.roster
            .iter()
            .find(|p| &p.connection_id == id)
            .map(|p| p.display_name.as_str())
    }

    /// The link to one participant.
    #[must_use]
    pub fn link(&self, peer: &ConnectionId) -> Option<&PeerLink> {
        self.links.get(peer)
    }

    /// Number of links, in any state.
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Tracks we are sending.
    #[must_use]
    pub fn local_tracks(&self) -> Vec<TrackKind> {
        self.tracks()
    }
}

/// Encodes a handshake step into a signal for `link`'s peer. A link whose
/// step cannot be encoded is failed on its own.
fn send_handshake(reaction: &mut Reaction, link: &mut PeerLink, step: Handshake) {
    match codec::encode(&step) {
        Ok(payload) => reaction.outgoing.push(ClientMessage::Signal {
            to: link.peer().clone(),
            payload,
        }),
        Err(e) => {
            tracing::warn!(peer = %link.peer(), error = %e, "failed to encode handshake");
            link.fail();
            reaction.events.push(CallEvent::LinkFailed {
                peer: link.peer().clone(),
                reason: e.to_string(),
            });
        }
    }
}
