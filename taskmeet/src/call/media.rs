//! Capture device access.
//!
//! Device failures never prevent joining a call. A participant without a
//! camera or microphone joins with an empty track set and can add tracks
//! later.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use taskmeet_proto::signal::TrackKind;

/// Why a capture device could not be opened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    /// The user or OS refused access.
    #[error("permission to use the {0} device was denied")]
    PermissionDenied(TrackKind),

    /// No device of this kind is present.
    #[error("no {0} device found")]
    NotFound(TrackKind),

    /// Another application holds the device.
    #[error("the {0} device is in use by another application")]
    Busy(TrackKind),

    /// Anything else.
    #[error("could not open {kind} device: {reason}")]
    Other {
        /// Track kind requested.
        kind: TrackKind,
        /// Platform description of the failure.
        reason: String,
    },
}

impl MediaError {
    /// The track kind that failed.
    #[must_use]
    pub const fn kind(&self) -> TrackKind {
        match self {
            Self::PermissionDenied(kind) | Self::NotFound(kind) | Self::Busy(kind) => *kind,
            Self::Other { kind, .. } => *kind,
        }
    }
}

/// Source of local capture tracks.
pub trait MediaDevices: Send {
    /// Opens a capture device.
    ///
    /// # Errors
    ///
    /// Returns the categorized device failure.
    fn acquire(&mut self, kind: TrackKind) -> Result<(), MediaError>;

    /// Closes a capture device. Releasing a device that is not held is a no-op.
    fn release(&mut self, kind: TrackKind);
}

/// A machine with no capture devices at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDevices;

impl MediaDevices for NoDevices {
    fn acquire(&mut self, kind: TrackKind) -> Result<(), MediaError> {
        Err(MediaError::NotFound(kind))
    }

    fn release(&mut self, _kind: TrackKind) {}
}

#[derive(Debug, Default)]
struct VirtualState {
    available: BTreeSet<TrackKind>,
    failures: HashMap<TrackKind, MediaError>,
    held: BTreeSet<TrackKind>,
}

/// Simulated devices for the CLI and tests.
///
/// Clones share state, so a test can keep a handle after moving one into a
/// session and observe what is held.
#[derive(Debug, Clone, Default)]
pub struct VirtualDevices {
    state: Arc<Mutex<VirtualState>>,
}

impl VirtualDevices {
    /// Devices for each listed kind.
    #[must_use]
    pub fn with(kinds: &[TrackKind]) -> Self {
        let devices = Self::default();
        devices.state.lock().available.extend(kinds.iter().copied());
        devices
    }

    /// Makes every acquire of `kind` fail with `error`.
    #[must_use]
    pub fn failing(self, kind: TrackKind, error: MediaError) -> Self {
        self.state.lock().failures.insert(kind, error);
        self
    }

    /// Kinds currently held open.
    #[must_use]
    pub fn held(&self) -> Vec<TrackKind> {
        self.state.lock().held.iter().copied().collect()
    }
}

impl MediaDevices for VirtualDevices {
    fn acquire(&mut self, kind: TrackKind) -> Result<(), MediaError> {
        let mut state = self.state.lock();
        if let Some(err) = state.failures.get(&kind) {
            return Err(err.clone());
        }
        if !state.available.contains(&kind) {
            return Err(MediaError::NotFound(kind));
        }
        state.held.insert(kind);
        Ok(())
    }

    fn release(&mut self, kind: TrackKind) {
        self.state.lock().held.remove(&kind);
    }
}
