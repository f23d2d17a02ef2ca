//! WebSocket transport for dashboard clients.
//!
//! This module only pumps frames between a socket and the dispatcher. Room
//! membership, access checks and fan-out live in the `realtime` crate.

pub mod handler;
