//! One-to-one signaling link between two participants.
//!
//! Roles are fixed by join order: the newcomer offers to everyone already in
//! the room and answers everyone who arrives later, so every pair has
//! exactly one offering side.

use taskmeet_proto::call::ConnectionId;
use taskmeet_proto::signal::{Handshake, SessionDescription, TrackKind};

/// Which side of the initial handshake this end plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    /// Sends the first offer.
    Offering,
    /// Waits for the first offer.
    Answering,
}

/// Handshake progress of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Answering side, no offer yet.
    AwaitingOffer,
    /// Offering side, no answer yet.
    OfferSent,
    /// Both descriptions exchanged.
    Connected,
    /// A handshake step was invalid.
    Failed,
    /// Torn down.
    Closed,
}

/// A handshake step arrived that the link cannot accept in its state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unexpected {step} from {peer} while {state:?}")]
pub struct LinkError {
    /// The remote participant.
    pub peer: ConnectionId,
    /// `"offer"` or `"answer"`.
    pub step: &'static str,
    /// State the link was in.
    pub state: LinkState,
}

/// What changed when a handshake step was applied.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LinkUpdate {
    /// Step to send back, if any.
    pub reply: Option<Handshake>,
    /// The link just reached [`LinkState::Connected`].
    pub connected: bool,
    /// The remote track set changed.
    pub remote_changed: bool,
}

/// Signaling state for one remote participant.
#[derive(Debug, Clone)]
pub struct PeerLink {
    peer: ConnectionId,
    role: LinkRole,
    state: LinkState,
    local_tracks: Vec<TrackKind>,
    remote_tracks: Vec<TrackKind>,
    local_revision: u32,
    remote_offer_revision: Option<u32>,
    renegotiating: bool,
}

impl PeerLink {
    /// Starts a link as the offering side and returns the first offer.
    #[must_use]
    pub fn offering(peer: ConnectionId, local: &[TrackKind]) -> (Self, Handshake) {
        let mut link = Self::blank(peer, LinkRole::Offering, LinkState::OfferSent);
        let offer = Handshake::Offer(link.describe(local));
        (link, offer)
    }

    /// Starts a link as the answering side.
    #[must_use]
    pub fn answering(peer: ConnectionId) -> Self {
        Self::blank(peer, LinkRole::Answering, LinkState::AwaitingOffer)
    }

    const fn blank(peer: ConnectionId, role: LinkRole, state: LinkState) -> Self {
        Self {
            peer,
            role,
            state,
            local_tracks: Vec::new(),
            remote_tracks: Vec::new(),
            local_revision: 0,
            remote_offer_revision: None,
            renegotiating: false,
        }
    }

    /// Applies a handshake step from the remote side.
    ///
    /// Stale renegotiation offers (revision not above the last one seen) and
    /// any step on a closed or failed link are dropped without error.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError`] if the step is not valid in the current state.
    pub fn receive(
        &mut self,
        step: Handshake,
        local: &[TrackKind],
    ) -> Result<LinkUpdate, LinkError> {
        if matches!(self.state, LinkState::Closed | LinkState::Failed) {
            return Ok(LinkUpdate::default());
        }
        match step {
            Handshake::Offer(desc) => {
                match self.state {
                    LinkState::AwaitingOffer => {}
                    LinkState::Connected => {
                        if self.remote_offer_revision.is_some_and(|r| desc.revision <= r) {
                            tracing::debug!(
                                peer = %self.peer,
                                revision = desc.revision,
                                "stale offer dropped"
                            );
                            return Ok(LinkUpdate::default());
                        }
                    }
                    _ => return Err(self.unexpected("offer")),
                }
                let connected = self.state == LinkState::AwaitingOffer;
                self.state = LinkState::Connected;
                self.remote_offer_revision = Some(desc.revision);
                let remote_changed = self.set_remote(desc.tracks);
                let answer = SessionDescription::new(self.local_revision, local.to_vec());
                self.local_tracks.clone_from(&answer.tracks);
                Ok(LinkUpdate {
                    reply: Some(Handshake::Answer(answer)),
                    connected,
                    remote_changed,
                })
            }
            Handshake::Answer(desc) => {
                let connected = match self.state {
                    LinkState::OfferSent => true,
                    LinkState::Connected if self.renegotiating => false,
                    _ => return Err(self.unexpected("answer")),
                };
                self.state = LinkState::Connected;
                self.renegotiating = false;
                let remote_changed = self.set_remote(desc.tracks);
                Ok(LinkUpdate {
                    reply: None,
                    connected,
                    remote_changed,
                })
            }
        }
    }

    /// Produces a renegotiation offer if the local track set differs from
    /// what was last described to the peer. Only connected links renegotiate.
    pub fn renegotiate(&mut self, local: &[TrackKind]) -> Option<Handshake> {
        if self.state != LinkState::Connected {
            return None;
        }
        let wanted = SessionDescription::new(0, local.to_vec()).tracks;
        if wanted == self.local_tracks {
            return None;
        }
        self.local_revision += 1;
        self.renegotiating = true;
        Some(Handshake::Offer(self.describe(local)))
    }

    /// Marks the link failed. Only this link is affected.
    pub fn fail(&mut self) {
        self.state = LinkState::Failed;
    }

    /// Tears the link down.
    pub fn close(&mut self) {
        self.state = LinkState::Closed;
        self.remote_tracks.clear();
    }

    fn describe(&mut self, local: &[TrackKind]) -> SessionDescription {
        let desc = SessionDescription::new(self.local_revision, local.to_vec());
        self.local_tracks.clone_from(&desc.tracks);
        desc
    }

    fn set_remote(&mut self, tracks: Vec<TrackKind>) -> bool {
        let tracks = SessionDescription::new(0, tracks).tracks;
        let changed = tracks != self.remote_tracks;
        self.remote_tracks = tracks;
        changed
    }

    fn unexpected(&self, step: &'static str) -> LinkError {
        LinkError {
            peer: self.peer.clone(),
            step,
            state: self.state,
        }
    }

    /// The remote participant.
    #[must_use]
    pub const fn peer(&self) -> &ConnectionId {
        &self.peer
    }

    #[must_use]
    pub const fn role(&self) -> LinkRole {
        self.role
    }

    #[must_use]
    pub const fn state(&self) -> LinkState {
        self.state
    }

    /// Tracks the remote side last described.
    #[must_use]
    pub fn remote_tracks(&self) -> &[TrackKind] {
        &self.remote_tracks
    }

    /// Tracks last described to the remote side.
    #[must_use]
    pub fn local_tracks(&self) -> &[TrackKind] {
        &self.local_tracks
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }
}
