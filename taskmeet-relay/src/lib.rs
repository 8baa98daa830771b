//! taskmeet signaling relay library.
//!
//! Exposes the relay server for use in tests and embedding. The relay
//! accepts WebSocket connections, keeps the authoritative roster and host of
//! every call room, and forwards opaque handshake payloads and chat lines
//! between participants of the same room.

pub mod config;
pub mod relay;
pub mod rooms;
