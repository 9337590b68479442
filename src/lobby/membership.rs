use std::collections::HashMap;

use crate::lobby::gateway::ConnectionId;

/// A user's place in a room, bound to the connection that took it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    pub room: String,
    pub connection_id: ConnectionId,
}

/// Which room each user currently occupies. A user is in at most one room.
#[derive(Debug, Default)]
pub struct MembershipIndex {
    seats: HashMap<String, Seat>,
}

impl MembershipIndex {
    /// Record that `username` now occupies `room` through `connection_id`.
    pub fn record(&mut self, username: &str, room: &str, connection_id: ConnectionId) {
        self.seats.insert(
            username.to_string(),
            Seat {
                room: room.to_string(),
                connection_id,
            },
        );
    }

    pub fn remove(&mut self, username: &str) -> Option<Seat> {
        self.seats.remove(username)
    }

    #[must_use]
    pub fn room_of(&self, username: &str) -> Option<&str> {
        self.seats.get(username).map(|seat| seat.room.as_str())
    }

    /// The room held by `username` through this exact connection.
    #[must_use]
    pub fn seat_room(&self, username: &str, connection_id: ConnectionId) -> Option<&str> {
        self.seats
            .get(username)
            .filter(|seat| seat.connection_id == connection_id)
            .map(|seat| seat.room.as_str())
    }

    #[must_use]
    pub fn holds_seat(&self, username: &str, connection_id: ConnectionId, room: &str) -> bool {
        self.seat_room(username, connection_id) == Some(room)
    }
}
