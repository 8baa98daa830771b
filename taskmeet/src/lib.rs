//! `taskmeet` client library.
//!
//! Two independent parts:
//!
//! - [`board`]: Kanban board reconciliation over a task store.
//! - [`call`]: call room sessions over a signaling relay.

pub mod board;
pub mod call;
pub mod config;
