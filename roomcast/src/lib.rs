//! Roomcast peer client.
//!
//! Connects to a roomcast relay, joins a room, and drives the
//! offer/answer/candidate exchange needed to bootstrap a direct
//! peer-to-peer media transport. The concrete transport and media
//! capture sit behind traits supplied by the host application.

pub mod media;
pub mod session;
pub mod signaling;
pub mod transport;
