//! Peer handshake payloads.
//!
//! A [`Handshake`] is what two participants exchange through
//! [`ClientMessage::Signal`](crate::call::ClientMessage::Signal) to bring
//! up a direct media link. The relay forwards the encoded bytes without
//! looking at them.
//!
//! Each side describes the tracks it sends in a [`SessionDescription`].
//! Enabling or disabling a single device produces a new description with a
//! higher `revision` on the existing link; the link is not torn down.

use serde::{Deserialize, Serialize};

/// Kind of media a track carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrackKind {
    /// Microphone.
    Audio,
    /// Camera.
    Video,
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// The set of tracks one side of a link is sending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Monotonic per-link counter. A description with a lower revision
    /// than the last one applied is stale and ignored.
    pub revision: u32,
    /// Tracks being sent, sorted and without duplicates.
    pub tracks: Vec<TrackKind>,
}

impl SessionDescription {
    /// Creates a description, normalizing the track list.
    #[must_use]
    pub fn new(revision: u32, mut tracks: Vec<TrackKind>) -> Self {
        tracks.sort();
        tracks.dedup();
        Self { revision, tracks }
    }
}

/// Handshake step exchanged between two participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handshake {
    /// Sent by the offering side, or by either side to renegotiate.
    Offer(SessionDescription),
    /// Reply to an offer.
    Answer(SessionDescription),
}
