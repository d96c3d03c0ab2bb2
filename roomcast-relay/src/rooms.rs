//! Room membership table for the relay server.
//!
//! Maintains the forward index (room to members) and the reverse index
//! (connection to rooms) so that a disconnecting connection can be
//! announced in every room it had joined, not just the most recent one.
//!
//! Rooms are ephemeral: an entry appears when the first member joins and
//! is removed when the last member leaves. There is no registry of valid
//! room identifiers and no explicit create or delete operation.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;
use uuid::Uuid;

/// Server-assigned identifier for a WebSocket connection.
///
/// Participant tokens are client-chosen and not unique, so fan-out is
/// keyed by connection, never by participant.
pub type ConnId = Uuid;

/// A room membership that ended because its connection went away.
///
/// Returned by [`RoomTable::remove_connection`] so the caller can fan
/// `UserDisconnected` out to the members left behind in each room.
#[derive(Debug)]
pub struct Departure {
    /// Room the connection belonged to.
    pub room: String,
    /// Participant token recorded when the connection joined this room.
    pub participant: String,
    /// Members remaining in the room after the removal.
    pub remaining: Vec<ConnId>,
}

#[derive(Default)]
struct Indexes {
    /// room -> member connection -> participant token announced at join.
    rooms: HashMap<String, HashMap<ConnId, String>>,
    /// connection -> rooms it has joined.
    memberships: HashMap<ConnId, HashSet<String>>,
}

/// Shared room membership state.
///
/// All mutation happens under a single [`RwLock`], which keeps a fan-out
/// snapshot and the membership change it was computed from atomic with
/// respect to concurrent joins and disconnects.
pub struct RoomTable {
    inner: RwLock<Indexes>,
}

impl Default for RoomTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomTable {
    /// Creates an empty room table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Indexes::default()),
        }
    }

    /// Adds a connection to a room, creating the room if needed.
    ///
    /// Returns the connections that were already members, i.e. the set to
    /// notify with `UserConnected`. Joining a room the connection is
    /// already in replaces the stored participant token and returns the
    /// other members again.
    pub async fn join(&self, room: &str, conn: ConnId, participant: &str) -> Vec<ConnId> {
        let mut inner = self.inner.write().await;

        let members = inner.rooms.entry(room.to_string()).or_default();
        let others: Vec<ConnId> = members.keys().filter(|c| **c != conn).copied().collect();
        members.insert(conn, participant.to_string());

        inner
            .memberships
            .entry(conn)
            .or_default()
            .insert(room.to_string());

        others
    }

    /// Returns every member of a room, or an empty list for an unknown room.
    pub async fn members(&self, room: &str) -> Vec<ConnId> {
        let inner = self.inner.read().await;
        inner
            .rooms
            .get(room)
            .map(|members| members.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Returns every member of a room except `sender`.
    ///
    /// `sender` does not have to be a member: a non-member addressing the
    /// room simply gets the full member list back, which is exactly the
    /// fan-out set for the signaling events.
    pub async fn others(&self, room: &str, sender: ConnId) -> Vec<ConnId> {
        let inner = self.inner.read().await;
        inner
            .rooms
            .get(room)
            .map(|members| members.keys().filter(|c| **c != sender).copied().collect())
            .unwrap_or_default()
    }

    /// Removes a connection from every room it joined.
    ///
    /// Returns one [`Departure`] per room, carrying the participant token
    /// recorded at join time and the members that remain. Rooms left
    /// empty are dropped from the table.
    pub async fn remove_connection(&self, conn: ConnId) -> Vec<Departure> {
        let mut inner = self.inner.write().await;

        let Some(joined) = inner.memberships.remove(&conn) else {
            return Vec::new();
        };

        let mut departures = Vec::with_capacity(joined.len());
        for room in joined {
            let Some(members) = inner.rooms.get_mut(&room) else {
                continue;
            };
            let Some(participant) = members.remove(&conn) else {
                continue;
            };
            let remaining: Vec<ConnId> = members.keys().copied().collect();
            if remaining.is_empty() {
                inner.rooms.remove(&room);
            }
            departures.push(Departure {
                room,
                participant,
                remaining,
            });
        }
        departures
    }

    /// Number of rooms currently holding at least one member.
    pub async fn room_count(&self) -> usize {
        self.inner.read().await.rooms.len()
    }
}
