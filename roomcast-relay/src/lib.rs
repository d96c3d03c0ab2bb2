//! Roomcast relay server library.
//!
//! Exposes the relay server for use in tests and embedding. The relay
//! accepts WebSocket connections, groups them into named rooms, and fans
//! signaling payloads out to room members without inspecting them.

pub mod config;
pub mod relay;
pub mod rooms;
