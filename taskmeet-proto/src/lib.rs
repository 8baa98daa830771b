//! Shared protocol definitions for the taskmeet wire format.

pub mod call;
pub mod codec;
pub mod signal;
pub mod task;
