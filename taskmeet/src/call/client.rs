//! Drives a [`CallSession`] over a [`SignalingChannel`].

use std::sync::Arc;
use std::time::Duration;

use taskmeet_proto::call::{ClientMessage, ConnectionId, ServerMessage};
use taskmeet_proto::signal::TrackKind;

use super::{CallError, CallEvent, CallSession, ChannelError, Reaction, SignalingChannel};

/// A call session wired to a live relay connection.
///
/// Messages produced by the session are sent in order before any method
/// returns. A closed channel is turned into [`CallEvent::RelayLost`].
pub struct CallClient<C> {
    channel: Arc<C>,
    session: CallSession,
    join_timeout: Duration,
}

impl<C: SignalingChannel> CallClient<C> {
    pub fn new(channel: Arc<C>, session: CallSession, join_timeout: Duration) -> Self {
        Self {
            channel,
            session,
            join_timeout,
        }
    }

    /// Joins a room and waits for the relay to confirm.
    ///
    /// Returns every event produced while joining, starting with
    /// [`CallEvent::Joined`] unless other relay traffic came first.
    ///
    /// # Errors
    ///
    /// - [`CallError::JoinRejected`] if the relay refuses (room full, ...).
    /// - [`CallError::JoinTimeout`] if no answer arrives in time.
    /// - Validation and channel errors from the session and channel.
    pub async fn join(&mut self, room_id: &str) -> Result<Vec<CallEvent>, CallError> {
        let msg = self.session.join(room_id)?;
        if let Err(e) = self.channel.send(&msg).await {
            self.session.relay_lost();
            return Err(e.into());
        }

        let deadline = tokio::time::Instant::now() + self.join_timeout;
        let mut events = Vec::new();
        loop {
            let msg = match tokio::time::timeout_at(deadline, self.channel.recv()).await {
                Ok(Ok(msg)) => msg,
                Ok(Err(e)) => {
                    self.session.relay_lost();
                    return Err(e.into());
                }
                Err(_) => {
                    tracing::warn!(room_id = %room_id, "join timed out");
                    self.session.leave();
                    return Err(CallError::JoinTimeout);
                }
            };
            let reply_is_join = matches!(msg, ServerMessage::Joined { .. });
            let rejection = match &msg {
                ServerMessage::Error { reason } => Some(reason.clone()),
                _ => None,
            };
            let reaction = self.session.handle(msg);
            events.extend(self.flush(reaction).await);
            if let Some(reason) = rejection {
                return Err(CallError::JoinRejected(reason));
            }
            if reply_is_join {
                return Ok(events);
            }
        }
    }

    /// Waits for the next relay message and applies it.
    pub async fn next_events(&mut self) -> Vec<CallEvent> {
        match self.channel.recv().await {
            Ok(msg) => self.apply(msg).await,
            Err(_) => self.session.relay_lost().events,
        }
    }

    /// Applies a relay message read elsewhere, e.g. by a reader task.
    pub async fn apply(&mut self, msg: ServerMessage) -> Vec<CallEvent> {
        let reaction = self.session.handle(msg);
        self.flush(reaction).await
    }

    /// Leaves the room. Does nothing if not in one.
    ///
    /// # Errors
    ///
    /// Returns the channel error if the leave could not be sent; the
    /// session is left either way.
    pub async fn leave(&mut self) -> Result<(), ChannelError> {
        match self.session.leave() {
            Some(msg) => self.channel.send(&msg).await,
            None => Ok(()),
        }
    }

    /// Hands the host role to `target`. Returns false if not allowed.
    ///
    /// # Errors
    ///
    /// Returns the channel error if the request could not be sent.
    pub async fn transfer_host(&self, target: &ConnectionId) -> Result<bool, ChannelError> {
        self.send_opt(self.session.transfer_host(target)).await
    }

    /// Ends the meeting. Returns false if not allowed.
    ///
    /// # Errors
    ///
    /// Returns the channel error if the request could not be sent.
    pub async fn end_meeting(&self) -> Result<bool, ChannelError> {
        self.send_opt(self.session.end_meeting()).await
    }

    /// Sends a room chat message.
    ///
    /// # Errors
    ///
    /// Returns validation or channel errors.
    pub async fn chat(&self, text: &str) -> Result<(), CallError> {
        let msg = self.session.broadcast_chat(text)?;
        self.channel.send(&msg).await?;
        Ok(())
    }

    /// Sends an opaque payload to one participant.
    ///
    /// # Errors
    ///
    /// Returns validation or channel errors.
    pub async fn signal(&self, to: &ConnectionId, payload: Vec<u8>) -> Result<(), CallError> {
        let msg = self.session.relay_signal(to, payload)?;
        self.channel.send(&msg).await?;
        Ok(())
    }

    /// Turns a local track on or off and renegotiates connected links.
    pub async fn set_track(&mut self, kind: TrackKind, enabled: bool) -> Vec<CallEvent> {
        let reaction = self.session.set_track(kind, enabled);
        self.flush(reaction).await
    }

    /// Treats the relay as gone.
    pub fn relay_lost(&mut self) -> Vec<CallEvent> {
        self.session.relay_lost().events
    }

    /// The underlying session.
    pub const fn session(&self) -> &CallSession {
        &self.session
    }

    /// Shared handle to the channel, for a dedicated reader task.
    pub fn channel(&self) -> Arc<C> {
        Arc::clone(&self.channel)
    }

    async fn send_opt(&self, msg: Option<ClientMessage>) -> Result<bool, ChannelError> {
        match msg {
            Some(msg) => self.channel.send(&msg).await.map(|()| true),
            None => Ok(false),
        }
    }

    /// Sends the reaction's messages. A send failure means the relay is
    /// gone; the remaining messages are dropped.
    async fn flush(&mut self, reaction: Reaction) -> Vec<CallEvent> {
        let mut events = reaction.events;
        for msg in reaction.outgoing {
            if let Err(e) = self.channel.send(&msg).await {
                tracing::warn!(error = %e, "send to relay failed");
                events.extend(self.session.relay_lost().events);
                break;
            }
        }
        events
    }
}
