//! Shared wire protocol definitions for the roomcast signaling relay.

pub mod signal;
